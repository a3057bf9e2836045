//! Background task capability.
//!
//! Stale revalidations and cache writes must outlive the request that
//! triggered them. Worker hosts expose a `waitUntil`-style hook to extend
//! background work past response flush; [`WaitUntil`] models that capability
//! so the engine can hand detached work to whatever the host provides
//! instead of spawning by convention.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;

/// Host-supplied hook keeping background work alive past the lifetime of
/// the current request.
pub trait WaitUntil: Send + Sync {
    /// Keep `task` running after the triggering request has finished.
    fn wait_until(&self, task: BoxFuture<'static, ()>);
}

/// Detach onto the tokio runtime.
///
/// Best effort: tasks are cut short if the runtime shuts down first. Hosts
/// with a real `waitUntil` hook should supply their own implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawn;

impl WaitUntil for TokioSpawn {
    fn wait_until(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}

/// Collects background tasks to be flushed at a controlled point, the way
/// worker runtimes collect `waitUntil` promises before tearing a request
/// down. Also gives tests deterministic control over background work.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<BoxFuture<'static, ()>>>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run all queued tasks to completion, in the order they were queued.
    /// Tasks queued while draining are drained too.
    pub async fn drain(&self) {
        loop {
            let task = self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            match task {
                Some(task) => task.await,
                None => break,
            }
        }
    }
}

impl WaitUntil for TaskQueue {
    fn wait_until(&self, task: BoxFuture<'static, ()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }
}
