//! Engine configuration and its fluent builder.
//!
//! # Example
//!
//! ```rust
//! use chainproj_engine::EngineBuilder;
//!
//! let config = EngineBuilder::new()
//!     .id("meme-factory")
//!     .max_workers(8)
//!     .resolver_concurrency(4)
//!     .tracker_window(256)
//!     .build_config();
//! ```

use serde::{Deserialize, Serialize};

use chainproj_pipeline::RetryConfig;

/// Configuration for an [`IndexEngine`](crate::IndexEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Unique name, used as the checkpoint key.
    pub id: String,
    /// Concurrent address groups dispatched per block batch.
    pub max_workers: usize,
    /// Concurrent in-flight resolver calls across the engine.
    pub resolver_concurrency: usize,
    /// Concurrent record evaluation within one pipeline run.
    pub fan_out: usize,
    /// Blocks of history retained for reorg recovery.
    pub tracker_window: usize,
    /// Save a checkpoint every N blocks.
    pub checkpoint_interval: u64,
    /// Resolution retry policy.
    #[serde(skip)]
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            max_workers: 4,
            resolver_concurrency: 8,
            fan_out: 16,
            // 128 blocks covers deep reorgs on all major EVM chains.
            tracker_window: 128,
            checkpoint_interval: 100,
            retry: RetryConfig::default(),
        }
    }
}

/// Fluent builder for [`EngineConfig`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine id (used for checkpoint keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the per-batch worker limit.
    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n;
        self
    }

    /// Cap concurrent resolver calls.
    pub fn resolver_concurrency(mut self, n: usize) -> Self {
        self.config.resolver_concurrency = n;
        self
    }

    /// Cap concurrent record evaluation inside one pipeline run.
    pub fn fan_out(mut self, n: usize) -> Self {
        self.config.fan_out = n;
        self
    }

    /// Set how many blocks of history the tracker retains.
    pub fn tracker_window(mut self, n: usize) -> Self {
        self.config.tracker_window = n;
        self
    }

    /// Set the checkpoint save interval (every N blocks).
    pub fn checkpoint_interval(mut self, n: u64) -> Self {
        self.config.checkpoint_interval = n;
        self
    }

    /// Replace the resolution retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`EngineConfig`].
    pub fn build_config(self) -> EngineConfig {
        self.config
    }
}
