//! Error types for the reindex engine.

use thiserror::Error;

use chainproj_core::StoreError;

/// Errors that can occur while dispatching events and following the chain.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("handler failed for '{event_type}' at {address}: {reason}")]
    Handler {
        event_type: String,
        address: String,
        reason: String,
    },

    #[error("handler already registered for '{event_type}' ({pattern})")]
    HandlerAlreadyRegistered { event_type: String, pattern: String },

    #[error(
        "reorg ancestor not found: fork at block {detected_at} is deeper than the \
         {window}-block history window"
    )]
    ReorgAncestorNotFound { detected_at: u64, window: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("engine halted: {reason}")]
    Halted { reason: String },
}

impl EngineError {
    /// Returns `true` for the one condition the engine cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ReorgAncestorNotFound { .. })
    }
}
