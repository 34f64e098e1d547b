//! Event handler trait and the dispatch lookup table.
//!
//! Routing is a table keyed by `(address pattern, event type)` instead of a
//! chain of string comparisons: registration rejects duplicates, lookup is
//! O(1) on the event type, and an unhandled event is recorded as a
//! diagnostic rather than silently vanishing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chainproj_core::ChainEvent;

use crate::context::EventContext;
use crate::error::EngineError;

/// Trait for user-provided mapping handlers.
///
/// Handlers must be idempotent with respect to re-dispatch of the same
/// event — reorg recovery re-dispatches canonical events and relies on
/// deterministic entity ids to overwrite stale state.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ChainEvent, ctx: &EventContext) -> Result<(), EngineError>;
}

/// Which contract addresses a registration applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressPattern {
    /// Any emitting address.
    Any,
    /// One specific address, compared case-insensitively.
    Exact(String),
}

impl AddressPattern {
    pub fn exact(address: impl Into<String>) -> Self {
        Self::Exact(address.into())
    }

    pub fn matches(&self, address: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(a) => a.eq_ignore_ascii_case(address),
        }
    }

    /// Lowercase the address so duplicate detection agrees with the
    /// case-insensitive routing in [`AddressPattern::matches`].
    fn normalized(self) -> Self {
        match self {
            Self::Exact(a) => Self::Exact(a.to_lowercase()),
            Self::Any => Self::Any,
        }
    }
}

impl std::fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(a) => write!(f, "{a}"),
        }
    }
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler registered — recorded, never fatal.
    Unregistered,
}

/// Registry of mapping handlers.
pub struct HandlerRegistry {
    by_event_type: HashMap<String, Vec<(AddressPattern, Arc<dyn EventHandler>)>>,
    unregistered: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            by_event_type: HashMap::new(),
            unregistered: AtomicU64::new(0),
        }
    }

    /// Register a handler for `(pattern, event_type)`.
    ///
    /// Registering the same pair twice is rejected so routing stays
    /// unambiguous.
    pub fn register(
        &mut self,
        pattern: AddressPattern,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EngineError> {
        let event_type = event_type.into();
        let pattern = pattern.normalized();
        let entries = self.by_event_type.entry(event_type.clone()).or_default();
        if entries.iter().any(|(p, _)| *p == pattern) {
            return Err(EngineError::HandlerAlreadyRegistered {
                event_type,
                pattern: pattern.to_string(),
            });
        }
        entries.push((pattern, handler));
        Ok(())
    }

    /// Route one event to its handler.
    ///
    /// Exact address registrations take precedence over `Any`. An event
    /// with no matching handler increments the diagnostic counter and is
    /// dropped with a trace.
    pub async fn dispatch(
        &self,
        event: &ChainEvent,
        ctx: &EventContext,
    ) -> Result<DispatchOutcome, EngineError> {
        let handler = self.by_event_type.get(&event.event_type).and_then(|entries| {
            entries
                .iter()
                .filter(|(p, _)| p.matches(&event.address))
                .max_by_key(|(p, _)| matches!(p, AddressPattern::Exact(_)))
                .map(|(_, h)| h)
        });
        match handler {
            Some(handler) => {
                handler.handle(event, ctx).await?;
                Ok(DispatchOutcome::Handled)
            }
            None => {
                self.unregistered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    event_type = %event.event_type,
                    address = %event.address,
                    block = event.block_number,
                    log_index = event.log_index,
                    "No handler registered, dropping event"
                );
                Ok(DispatchOutcome::Unregistered)
            }
        }
    }

    /// How many events were dropped for lack of a handler.
    pub fn unregistered_count(&self) -> u64 {
        self.unregistered.load(Ordering::Relaxed)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use chainproj_core::{
        BlockRef, MemoryEntityStore, StaticResolver, Value,
    };
    use chainproj_pipeline::ResolverBridge;

    use crate::context::CancelFlag;

    struct Counter(Arc<AtomicU32>);

    #[async_trait]
    impl EventHandler for Counter {
        async fn handle(&self, _e: &ChainEvent, _c: &EventContext) -> Result<(), EngineError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn dummy_ctx() -> EventContext {
        EventContext::new(
            Arc::new(MemoryEntityStore::new()),
            ResolverBridge::new(Arc::new(StaticResolver::new())),
            BlockRef::new(1, "0xa", "0x0"),
            CancelFlag::new(),
        )
    }

    fn dummy_event(address: &str, event_type: &str) -> ChainEvent {
        ChainEvent {
            address: address.into(),
            event_type: event_type.into(),
            args: vec![Value::Null],
            block_number: 1,
            block_hash: "0xa".into(),
            parent_block_hash: "0x0".into(),
            log_index: 0,
        }
    }

    #[tokio::test]
    async fn dispatch_routes_by_event_type_and_address() {
        let count = Arc::new(AtomicU32::new(0));
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                AddressPattern::exact("0xAA"),
                "constructed",
                Arc::new(Counter(count.clone())),
            )
            .unwrap();

        let ctx = dummy_ctx();
        // Case-insensitive address match.
        let out = registry.dispatch(&dummy_event("0xaa", "constructed"), &ctx).await.unwrap();
        assert_eq!(out, DispatchOutcome::Handled);
        // Wrong address: dropped with diagnostic.
        let out = registry.dispatch(&dummy_event("0xBB", "constructed"), &ctx).await.unwrap();
        assert_eq!(out, DispatchOutcome::Unregistered);
        // Unknown event type: dropped with diagnostic.
        let out = registry.dispatch(&dummy_event("0xaa", "minted"), &ctx).await.unwrap();
        assert_eq!(out, DispatchOutcome::Unregistered);

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(registry.unregistered_count(), 2);
    }

    #[tokio::test]
    async fn exact_pattern_beats_any() {
        let exact_count = Arc::new(AtomicU32::new(0));
        let any_count = Arc::new(AtomicU32::new(0));
        let mut registry = HandlerRegistry::new();
        registry
            .register(AddressPattern::Any, "buy", Arc::new(Counter(any_count.clone())))
            .unwrap();
        registry
            .register(
                AddressPattern::exact("0xAA"),
                "buy",
                Arc::new(Counter(exact_count.clone())),
            )
            .unwrap();

        let ctx = dummy_ctx();
        registry.dispatch(&dummy_event("0xAA", "buy"), &ctx).await.unwrap();
        registry.dispatch(&dummy_event("0xCC", "buy"), &ctx).await.unwrap();

        assert_eq!(exact_count.load(Ordering::Relaxed), 1);
        assert_eq!(any_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = HandlerRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        registry
            .register(AddressPattern::Any, "buy", Arc::new(Counter(count.clone())))
            .unwrap();
        let err = registry
            .register(AddressPattern::Any, "buy", Arc::new(Counter(count)))
            .unwrap_err();
        assert!(matches!(err, EngineError::HandlerAlreadyRegistered { .. }));
    }

    #[test]
    fn duplicate_exact_registration_rejected_across_address_case() {
        let mut registry = HandlerRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        registry
            .register(
                AddressPattern::exact("0xAA"),
                "buy",
                Arc::new(Counter(count.clone())),
            )
            .unwrap();
        // Same address, different casing: one registration slot, not two.
        let err = registry
            .register(AddressPattern::exact("0xaa"), "buy", Arc::new(Counter(count)))
            .unwrap_err();
        assert!(matches!(err, EngineError::HandlerAlreadyRegistered { .. }));
    }
}
