//! Cache key composition and normalization.
//!
//! A cache key is either a single string or an ordered sequence of primitive
//! parts (a GraphQL query plus its variables, for example). Two keys are
//! equal exactly when their normalized string forms are equal; normalization
//! is stable and order-sensitive.

use serde_json::Value;

/// One component of a composite cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Bool(bool),
    /// Structured data (query variables, options objects). Serialized with
    /// sorted object keys, so logically equal values normalize identically.
    Json(Value),
}

impl KeyPart {
    fn write_to(&self, out: &mut String) {
        match self {
            Self::Str(s) => out.push_str(s),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Json(value) => {
                out.push_str(&serde_json::to_string(value).unwrap_or_default())
            }
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Value> for KeyPart {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// A cache key uniquely identifying a sub-request's value in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    /// A ready-made key string.
    Single(String),
    /// An ordered sequence of parts, joined during normalization.
    Parts(Vec<KeyPart>),
}

impl CacheKey {
    /// Build a composite key from parts.
    pub fn parts<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self::Parts(parts.into_iter().map(Into::into).collect())
    }

    /// Normalize into the string form used for store lookups and in-flight
    /// registration. Deterministic and order-sensitive.
    pub fn normalize(&self) -> String {
        match self {
            Self::Single(key) => key.clone(),
            Self::Parts(parts) => {
                let mut out = String::new();
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        out.push('|');
                    }
                    part.write_to(&mut out);
                }
                out
            }
        }
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::Single(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self::Single(key)
    }
}

impl From<Vec<KeyPart>> for CacheKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self::Parts(parts)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.normalize())
    }
}
