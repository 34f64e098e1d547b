//! chainproj-core — shared data model and external contracts for the
//! chainproj projection/indexing pipeline.
//!
//! # Architecture
//!
//! ```text
//! SourceRecord ─▶ Pipeline (chainproj-pipeline) ─▶ Entity ─▶ EntityStore
//!                     │
//!                     └── ContentResolver (external content store)
//! ChainEvent / ReindexSignal ─▶ engine (chainproj-engine)
//! ```

pub mod entity;
pub mod error;
pub mod event;
pub mod record;
pub mod resolver;
pub mod store;
pub mod value;

pub use entity::Entity;
pub use error::{ResolveError, StoreError};
pub use event::{BlockRef, ChainEvent, ReindexSignal, SignalKind};
pub use record::SourceRecord;
pub use resolver::{ContentResolver, StaticResolver};
pub use store::{EntityStore, MemoryEntityStore};
pub use value::Value;
