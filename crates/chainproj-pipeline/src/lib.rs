//! chainproj-pipeline — declarative projection pipeline over source records.
//!
//! # Architecture
//!
//! ```text
//! Pipeline (step list) ──run──▶ evaluator
//!                                  ├── descent: leading Get steps
//!                                  ├── expansion: one record per element
//!                                  ├── record phase: Select/Rename/Over/
//!                                  │   Resolve/Filter/Flatten/Exclude
//!                                  └── ResolverBridge (memo + retry + limit)
//! ```

pub mod bridge;
pub mod error;
pub mod eval;
pub mod pipeline;
pub mod step;

pub use bridge::{ResolverBridge, RetryConfig, RunCache};
pub use error::ProjectionError;
pub use eval::{ProjectOutcome, ProjectedFields, Projector, RunResult};
pub use pipeline::Pipeline;
pub use step::{OverFn, Step};
