//! The explicit context handed to event handlers.
//!
//! Handlers get everything through this object — entity store, resolver
//! bridge, block metadata, cancellation — so there is no ambient global
//! state anywhere in the dispatch path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chainproj_core::{BlockRef, Entity, EntityStore};
use chainproj_pipeline::ResolverBridge;

use crate::error::EngineError;

/// Cooperative cancellation flag shared between the coordinator and the
/// handlers it spawned. In-flight resolver calls finish; their writes are
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context passed to event handlers during dispatch.
#[derive(Clone)]
pub struct EventContext {
    store: Arc<dyn EntityStore>,
    bridge: ResolverBridge,
    block: BlockRef,
    cancel: CancelFlag,
}

impl EventContext {
    pub fn new(
        store: Arc<dyn EntityStore>,
        bridge: ResolverBridge,
        block: BlockRef,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            store,
            bridge,
            block,
            cancel,
        }
    }

    /// The block whose events are being dispatched.
    pub fn block(&self) -> &BlockRef {
        &self.block
    }

    /// The resolver bridge for pipeline runs inside handlers.
    pub fn bridge(&self) -> &ResolverBridge {
        &self.bridge
    }

    /// The entity store. Prefer [`EventContext::write`], which honors
    /// cancellation.
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Returns `true` once this block's branch has been abandoned.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write one entity, unless the run was cancelled by a reorg.
    ///
    /// Returns `true` if the write was committed, `false` if it was skipped
    /// because the block is no longer canonical.
    pub async fn write(&self, entity: Entity) -> Result<bool, EngineError> {
        if self.is_cancelled() {
            tracing::debug!(
                entity_type = %entity.entity_type,
                id = %entity.id,
                block = self.block.number,
                "Skipping write for abandoned block"
            );
            return Ok(false);
        }
        self.store
            .add(&entity.entity_type, &entity.id, entity.fields)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chainproj_core::{MemoryEntityStore, StaticResolver, Value};

    fn ctx(store: Arc<MemoryEntityStore>, cancel: CancelFlag) -> EventContext {
        EventContext::new(
            store,
            ResolverBridge::new(Arc::new(StaticResolver::new())),
            BlockRef::new(100, "0xa", "0x0"),
            cancel,
        )
    }

    fn entity(v: i64) -> Entity {
        let mut fields = BTreeMap::new();
        fields.insert("v".to_string(), Value::Int(v));
        Entity::new("Meme", "0xaa", fields)
    }

    #[tokio::test]
    async fn write_commits_when_not_cancelled() {
        let store = Arc::new(MemoryEntityStore::new());
        let ctx = ctx(store.clone(), CancelFlag::new());
        assert!(ctx.write(entity(1)).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn write_skipped_after_cancel() {
        let store = Arc::new(MemoryEntityStore::new());
        let cancel = CancelFlag::new();
        let ctx = ctx(store.clone(), cancel.clone());
        cancel.cancel();
        assert!(!ctx.write(entity(1)).await.unwrap());
        assert!(store.is_empty());
    }
}
