//! Contract for resolving content references against an external
//! content-addressed store (IPFS-like).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ResolveError;
use crate::value::Value;

/// Turns a content reference (hash or path) into resolved data.
///
/// Implementations must be referentially transparent: the same reference
/// always yields the same value, permanently. The pipeline's memoization
/// and the determinism property both rely on this.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<Value, ResolveError>;
}

/// Resolver backed by a fixed in-memory table. For tests and fixtures.
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, Value>,
    /// Number of resolve calls made, for memoization assertions.
    calls: Mutex<u64>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: impl Into<String>, value: Value) -> Self {
        self.entries.insert(reference.into(), value);
        self
    }

    /// How many times `resolve` has been invoked.
    pub fn call_count(&self) -> u64 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ContentResolver for StaticResolver {
    async fn resolve(&self, reference: &str) -> Result<Value, ResolveError> {
        *self.calls.lock().unwrap() += 1;
        self.entries
            .get(reference)
            .cloned()
            .ok_or_else(|| ResolveError::Failed {
                reference: reference.to_string(),
                cause: "not found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_hits_and_counts() {
        let resolver = StaticResolver::new().with("Qm123", Value::from("meta"));
        assert_eq!(resolver.resolve("Qm123").await.unwrap(), Value::from("meta"));
        assert!(resolver.resolve("Qm999").await.is_err());
        assert_eq!(resolver.call_count(), 2);
    }
}
