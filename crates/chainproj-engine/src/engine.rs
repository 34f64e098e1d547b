//! The index engine — wires the coordinator, dispatcher, scheduler, and
//! checkpoints into one push-driven processing loop.
//!
//! The source adapter feeds block batches in block-number order. For each
//! batch the engine:
//!   1. offers the block to the coordinator (reorg check),
//!   2. dispatches the batch's events per-address in order,
//!   3. advances the checkpoint.
//!
//! On a fork the engine reports the common ancestor; the caller re-feeds
//! the canonical branch's batches from `ancestor + 1`, and recomputation
//! overwrites stale entities through deterministic ids.

use std::sync::Arc;

use chainproj_core::{BlockRef, ChainEvent, ContentResolver, EntityStore, ReindexSignal};
use chainproj_pipeline::ResolverBridge;

use crate::checkpoint::{CheckpointManager, CheckpointStore, MemoryCheckpointStore};
use crate::config::EngineConfig;
use crate::context::EventContext;
use crate::coordinator::{CoordinatorState, Observation, ReindexCoordinator};
use crate::error::EngineError;
use crate::handler::HandlerRegistry;
use crate::scheduler::{BatchStats, Scheduler};

/// One block's worth of decoded events.
#[derive(Debug, Clone)]
pub struct BlockBatch {
    pub block: BlockRef,
    pub events: Vec<ChainEvent>,
}

impl BlockBatch {
    pub fn new(block: BlockRef, events: Vec<ChainEvent>) -> Self {
        Self { block, events }
    }
}

/// Reorg details reported back to the feeding loop.
#[derive(Debug, Clone)]
pub struct ReorgInfo {
    /// Last block shared by both branches.
    pub ancestor: BlockRef,
    /// Blocks whose derived entities were invalidated, oldest first.
    pub abandoned: Vec<BlockRef>,
}

/// Outcome of processing one block batch.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub state: CoordinatorState,
    pub stats: BatchStats,
    /// Present when this block revealed a fork.
    pub reorg: Option<ReorgInfo>,
}

/// The push-driven indexing engine.
pub struct IndexEngine {
    config: EngineConfig,
    registry: HandlerRegistry,
    store: Arc<dyn EntityStore>,
    bridge: ResolverBridge,
    coordinator: ReindexCoordinator,
    scheduler: Scheduler,
    checkpoint: CheckpointManager,
    halted: Option<String>,
}

impl IndexEngine {
    /// Build an engine with an in-memory checkpoint store.
    pub fn new(
        config: EngineConfig,
        registry: HandlerRegistry,
        store: Arc<dyn EntityStore>,
        resolver: Arc<dyn ContentResolver>,
    ) -> Self {
        Self::with_checkpoint_store(
            config,
            registry,
            store,
            resolver,
            Box::new(MemoryCheckpointStore::new()),
        )
    }

    pub fn with_checkpoint_store(
        config: EngineConfig,
        registry: HandlerRegistry,
        store: Arc<dyn EntityStore>,
        resolver: Arc<dyn ContentResolver>,
        checkpoints: Box<dyn CheckpointStore>,
    ) -> Self {
        let bridge = ResolverBridge::new(resolver)
            .with_retry(config.retry.clone())
            .with_concurrency(config.resolver_concurrency)
            .with_fan_out(config.fan_out);
        let checkpoint =
            CheckpointManager::new(checkpoints, &config.id, config.checkpoint_interval);
        Self {
            registry,
            store,
            bridge,
            coordinator: ReindexCoordinator::new(config.tracker_window),
            scheduler: Scheduler::new(config.max_workers),
            checkpoint,
            halted: None,
            config,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    /// The position a restarted engine should resume feeding from.
    pub async fn resume_point(&self) -> Result<Option<u64>, EngineError> {
        Ok(self.checkpoint.load().await?.map(|cp| cp.block_number + 1))
    }

    /// Apply a chain-monitor signal.
    pub async fn apply_signal(&mut self, signal: &ReindexSignal) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.coordinator.apply_signal(signal);
        Ok(())
    }

    /// Process one block batch.
    ///
    /// Returns the fatal `ReorgAncestorNotFound` if the fork exceeds the
    /// retained window; the engine halts and refuses further batches.
    pub async fn process_block(&mut self, batch: BlockBatch) -> Result<ProcessOutcome, EngineError> {
        self.ensure_running()?;
        let block = batch.block.clone();

        let reorg = match self.coordinator.observe(&block) {
            Ok(Observation::Extend) => None,
            Ok(Observation::Reorg {
                ancestor,
                abandoned,
            }) => {
                // Rewind the checkpoint so a crash mid-recovery resumes
                // from the ancestor, not the abandoned branch.
                self.checkpoint
                    .force_save(ancestor.number, &ancestor.hash)
                    .await?;
                Some(ReorgInfo {
                    ancestor,
                    abandoned,
                })
            }
            Err(err) => {
                tracing::error!(error = %err, "Halting: cannot recover reorg");
                self.halted = Some(err.to_string());
                return Err(err);
            }
        };

        // Events from blocks already known stale never produce entities.
        let events: Vec<ChainEvent> = batch
            .events
            .into_iter()
            .filter(|e| {
                let stale =
                    e.block_hash != block.hash || self.coordinator.is_invalidated(&e.block_hash);
                if stale {
                    tracing::debug!(
                        event_type = %e.event_type,
                        block_hash = %e.block_hash,
                        "Dropping event from non-canonical block"
                    );
                }
                !stale
            })
            .collect();

        let cancel = self.coordinator.begin_batch(&block);
        let ctx = EventContext::new(
            self.store.clone(),
            self.bridge.clone(),
            block.clone(),
            cancel,
        );
        let stats = self.scheduler.dispatch_batch(&self.registry, events, &ctx).await;
        self.coordinator.finish_batch(&block);

        self.checkpoint.maybe_save(block.number, &block.hash).await?;

        tracing::info!(
            engine = %self.config.id,
            block = block.number,
            handled = stats.handled,
            unregistered = stats.unregistered,
            errors = stats.errors.len(),
            state = ?self.coordinator.state(),
            "Block processed"
        );

        Ok(ProcessOutcome {
            state: self.coordinator.state(),
            stats,
            reorg,
        })
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        match &self.halted {
            Some(reason) => Err(EngineError::Halted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    use chainproj_core::{MemoryEntityStore, StaticResolver, Value};

    use crate::config::EngineBuilder;
    use crate::handler::{AddressPattern, EventHandler};

    struct NoOp;

    #[async_trait]
    impl EventHandler for NoOp {
        async fn handle(&self, _e: &ChainEvent, _c: &EventContext) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn engine() -> IndexEngine {
        let mut registry = HandlerRegistry::new();
        registry
            .register(AddressPattern::Any, "tick", Arc::new(NoOp))
            .unwrap();
        IndexEngine::new(
            EngineBuilder::new().checkpoint_interval(1).build_config(),
            registry,
            Arc::new(MemoryEntityStore::new()),
            Arc::new(StaticResolver::new()),
        )
    }

    fn batch(number: u64, hash: &str, parent: &str) -> BlockBatch {
        let block = BlockRef::new(number, hash, parent);
        let event = ChainEvent {
            address: "0xAA".into(),
            event_type: "tick".into(),
            args: vec![Value::Int(number as i64)],
            block_number: number,
            block_hash: hash.into(),
            parent_block_hash: parent.into(),
            log_index: 0,
        };
        BlockBatch::new(block, vec![event])
    }

    #[tokio::test]
    async fn processes_blocks_and_checkpoints() {
        let mut engine = engine();
        engine.process_block(batch(1, "0x1", "0x0")).await.unwrap();
        let out = engine.process_block(batch(2, "0x2", "0x1")).await.unwrap();
        assert_eq!(out.stats.handled, 1);
        assert_eq!(out.state, CoordinatorState::CaughtUp);
        assert_eq!(engine.resume_point().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn fork_reports_ancestor_and_rewinds_checkpoint() {
        let mut engine = engine();
        engine.process_block(batch(1, "0x1", "0x0")).await.unwrap();
        engine.process_block(batch(2, "0x2", "0x1")).await.unwrap();
        engine.process_block(batch(3, "0x3", "0x2")).await.unwrap();

        let out = engine.process_block(batch(2, "0x2p", "0x1")).await.unwrap();
        let reorg = out.reorg.expect("reorg info");
        assert_eq!(reorg.ancestor.number, 1);
        assert_eq!(reorg.abandoned.len(), 2);
        assert_eq!(out.state, CoordinatorState::ReorgRecovery);
    }

    #[tokio::test]
    async fn halts_on_unrecoverable_fork() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(AddressPattern::Any, "tick", Arc::new(NoOp))
            .unwrap();
        let mut engine = IndexEngine::new(
            EngineBuilder::new().tracker_window(2).build_config(),
            registry,
            Arc::new(MemoryEntityStore::new()),
            Arc::new(StaticResolver::new()),
        );
        engine.process_block(batch(1, "0x1", "0x0")).await.unwrap();
        engine.process_block(batch(2, "0x2", "0x1")).await.unwrap();
        engine.process_block(batch(3, "0x3", "0x2")).await.unwrap();

        // Window holds [2, 3]; a fork attaching to block 1 is unrecoverable.
        let err = engine.process_block(batch(2, "0x2p", "0x1")).await.unwrap_err();
        assert!(err.is_fatal());

        let err = engine.process_block(batch(4, "0x4", "0x3")).await.unwrap_err();
        assert!(matches!(err, EngineError::Halted { .. }));
    }

    #[tokio::test]
    async fn mismatched_event_block_hash_is_dropped() {
        let mut engine = engine();
        let mut b = batch(1, "0x1", "0x0");
        b.events[0].block_hash = "0xother".into();
        let out = engine.process_block(b).await.unwrap();
        assert_eq!(out.stats.handled, 0);
    }
}
