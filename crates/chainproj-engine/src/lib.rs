//! chainproj-engine — event-driven incremental reindexing with reorg
//! recovery.
//!
//! The engine consumes decoded chain events in block batches, routes them
//! to registered projection handlers, and keeps derived entities
//! consistent with the canonical chain across reorganizations.
//!
//! ```text
//!                    ┌──────────────────┐
//!   BlockBatch ────▶ │  IndexEngine     │
//!                    │  ┌────────────┐  │
//!                    │  │ Coordinator│──┼── invalidation / cancel
//!                    │  └────────────┘  │
//!                    │  ┌────────────┐  │     ┌───────────────┐
//!                    │  │ Scheduler  │──┼────▶│ HandlerRegistry│
//!                    │  └────────────┘  │     └───────┬───────┘
//!                    │  ┌────────────┐  │             ▼
//!                    │  │ Checkpoints│  │       EventHandler
//!                    │  └────────────┘  │             │
//!                    └──────────────────┘             ▼
//!                                               EntityStore
//! ```
//!
//! Handlers run projection pipelines (see `chainproj-pipeline`) and write
//! entities through the [`EventContext`]. Per-address event order is
//! preserved; distinct addresses dispatch concurrently.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod handler;
pub mod scheduler;
pub mod tracker;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryCheckpointStore};
pub use config::{EngineBuilder, EngineConfig};
pub use context::{CancelFlag, EventContext};
pub use coordinator::{CoordinatorState, Observation, ReindexCoordinator};
pub use engine::{BlockBatch, IndexEngine, ProcessOutcome, ReorgInfo};
pub use error::EngineError;
pub use handler::{AddressPattern, DispatchOutcome, EventHandler, HandlerRegistry};
pub use scheduler::{BatchStats, Scheduler};
pub use tracker::{BlockTracker, PushResult};
