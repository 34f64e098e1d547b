//! Error types for pipeline construction and execution.

use thiserror::Error;

use chainproj_core::ResolveError;

/// A per-record projection failure.
///
/// These abort only the failing record's contribution to the entity set;
/// sibling records continue unaffected.
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    #[error("path '{path}' not found in source record")]
    PathNotFound { path: String },

    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    #[error(transparent)]
    Resolution(#[from] ResolveError),
}
