//! In-flight registry providing single-flight de-duplication.
//!
//! Concurrent callers producing the same key share one producer run: the
//! first caller becomes the leader and actually invokes the producer, the
//! rest become followers and await the leader's broadcast outcome. The
//! registry covers a single process; separate processes can still duplicate
//! a fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::watch;

use crate::error::CacheError;

/// Outcome broadcast from a leader to its followers.
pub(crate) type FlightOutcome = Result<Value, CacheError>;

type FlightReceiver = watch::Receiver<Option<FlightOutcome>>;

/// Role assigned to a caller joining the flight for a key.
pub(crate) enum Flight {
    /// No producer was in flight; this caller runs it and must settle the
    /// guard.
    Leader(FlightGuard),
    /// A producer is already running; await its outcome.
    Follower(FlightReceiver),
}

/// Process-wide map of keys with a producer currently in flight.
///
/// `begin` is an atomic check-and-set under a mutex, so at most one leader
/// can exist per key at any instant even on a multithreaded runtime.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    pending: Mutex<HashMap<String, FlightReceiver>>,
}

impl InFlightRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no producer is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether a producer is currently in flight for `key`.
    pub fn in_flight(&self, key: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Join the flight for `key`, creating it if absent.
    pub(crate) fn begin(registry: &Arc<InFlightRegistry>, key: &str) -> Flight {
        let mut pending = registry
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(rx) = pending.get(key) {
            return Flight::Follower(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        pending.insert(key.to_string(), rx);

        Flight::Leader(FlightGuard {
            key: key.to_string(),
            registry: Arc::clone(registry),
            tx,
            settled: false,
        })
    }

    fn remove(&self, key: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Leader-side handle for one in-flight producer run.
///
/// Settling removes the key from the registry and broadcasts the outcome to
/// followers. Dropping without settling (leader panicked or was cancelled)
/// also removes the key so a later caller can retry; pending followers then
/// observe the closed channel as [`CacheError::Aborted`].
pub(crate) struct FlightGuard {
    key: String,
    registry: Arc<InFlightRegistry>,
    tx: watch::Sender<Option<FlightOutcome>>,
    settled: bool,
}

impl FlightGuard {
    /// Remove the in-flight handle and broadcast the outcome.
    ///
    /// Removal happens before the broadcast so a caller arriving after
    /// settlement starts a fresh flight instead of reading a stale one.
    pub(crate) fn settle(mut self, outcome: FlightOutcome) {
        self.registry.remove(&self.key);
        let _ = self.tx.send(Some(outcome));
        self.settled = true;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.remove(&self.key);
        }
    }
}

/// Wait for the leader's broadcast.
pub(crate) async fn await_outcome(mut rx: FlightReceiver) -> FlightOutcome {
    match rx.wait_for(|outcome| outcome.is_some()).await {
        Ok(outcome) => outcome.clone().unwrap_or(Err(CacheError::Aborted)),
        Err(_) => Err(CacheError::Aborted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leader(registry: &Arc<InFlightRegistry>, key: &str) -> FlightGuard {
        match InFlightRegistry::begin(registry, key) {
            Flight::Leader(guard) => guard,
            Flight::Follower(_) => panic!("expected leader for {key}"),
        }
    }

    #[tokio::test]
    async fn test_first_caller_is_leader_then_followers() {
        let registry = Arc::new(InFlightRegistry::new());

        let guard = leader(&registry, "k");
        assert!(registry.in_flight("k"));

        assert!(matches!(
            InFlightRegistry::begin(&registry, "k"),
            Flight::Follower(_)
        ));
        assert!(matches!(
            InFlightRegistry::begin(&registry, "k"),
            Flight::Follower(_)
        ));
        assert_eq!(registry.len(), 1);

        guard.settle(Ok(json!(1)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_followers_receive_leader_outcome() {
        let registry = Arc::new(InFlightRegistry::new());

        let guard = leader(&registry, "k");
        let rx = match InFlightRegistry::begin(&registry, "k") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("expected follower"),
        };

        guard.settle(Ok(json!({"title": "Shirt"})));

        let outcome = await_outcome(rx).await;
        assert_eq!(outcome.unwrap(), json!({"title": "Shirt"}));
    }

    #[tokio::test]
    async fn test_followers_share_leader_error() {
        let registry = Arc::new(InFlightRegistry::new());

        let guard = leader(&registry, "k");
        let rx = match InFlightRegistry::begin(&registry, "k") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("expected follower"),
        };

        guard.settle(Err(CacheError::producer(anyhow::anyhow!("upstream 500"))));

        assert!(matches!(
            await_outcome(rx).await,
            Err(CacheError::Producer(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_leader_aborts_followers_and_clears_key() {
        let registry = Arc::new(InFlightRegistry::new());

        let guard = leader(&registry, "k");
        let rx = match InFlightRegistry::begin(&registry, "k") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("expected follower"),
        };

        drop(guard);

        assert!(matches!(await_outcome(rx).await, Err(CacheError::Aborted)));
        assert!(!registry.in_flight("k"));
    }

    #[tokio::test]
    async fn test_new_flight_starts_after_settle() {
        let registry = Arc::new(InFlightRegistry::new());

        leader(&registry, "k").settle(Ok(json!(1)));
        // The key was removed on settle, so the next caller leads again.
        let guard = leader(&registry, "k");
        guard.settle(Ok(json!(2)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_fly_independently() {
        let registry = Arc::new(InFlightRegistry::new());

        let a = leader(&registry, "a");
        let b = leader(&registry, "b");
        assert_eq!(registry.len(), 2);

        a.settle(Ok(json!(1)));
        assert!(registry.in_flight("b"));
        b.settle(Ok(json!(2)));
        assert!(registry.is_empty());
    }
}
