//! Error types for the core contracts.

use thiserror::Error;

/// Failure to resolve a content reference through the external store.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("resolution failed for '{reference}': {cause}")]
    Failed { reference: String, cause: String },

    #[error("malformed content at '{reference}': {reason}")]
    Malformed { reference: String, reason: String },
}

impl ResolveError {
    /// The content reference the failure is attributed to.
    pub fn reference(&self) -> &str {
        match self {
            Self::Failed { reference, .. } | Self::Malformed { reference, .. } => reference,
        }
    }

    /// Malformed content never resolves differently on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Failure at the entity store boundary.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("conflicting write to {entity_type}/{id}")]
    WriteConflict { entity_type: String, id: String },

    #[error("store error: {0}")]
    Other(String),
}
