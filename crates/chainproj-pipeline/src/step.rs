//! Step descriptors — the tagged variants a pipeline is built from.
//!
//! Steps are immutable values interpreted by a single evaluator rather than
//! a trait-object hierarchy with per-step virtual execution. That keeps a
//! pipeline a plain, inspectable list that can be shared across runs.

use std::fmt;
use std::sync::Arc;

use chainproj_core::Value;

/// A pure, in-place transformation applied by [`Step::Over`].
///
/// Must not perform I/O — external lookups go through `Step::Resolve` so the
/// evaluator knows where its suspension points are.
pub type OverFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// One named transformation in a pipeline.
#[derive(Clone)]
pub enum Step {
    /// Descend into a named subtree. Leading `Get` steps navigate the source
    /// record; once the descent ends, a collection-shaped value expands into
    /// one record per element. `optional` absence drops the record instead
    /// of failing.
    Get { path: String, optional: bool },
    /// Keep only the named fields. An unknown name fails that record with
    /// `UnknownField`.
    Select { fields: Vec<String> },
    /// Bijective field renaming; downstream steps see the new names.
    Rename { pairs: Vec<(String, String)> },
    /// Apply a pure function to one field's value in place.
    Over { field: String, func: OverFn },
    /// Treat the field as a content reference and replace it with the value
    /// the resolver bridge returns. The only suspending step.
    Resolve { field: String },
    /// Drop the record unless `field` equals `value`. Never an error.
    Filter { field: String, value: Value },
    /// Merge one level of nested maps into the parent namespace,
    /// last-write-wins with nested entries applied after the parent's own.
    Flatten,
    /// Remove the named fields; inverse of `Select`.
    Exclude { fields: Vec<String> },
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Get { path, optional } => f
                .debug_struct("Get")
                .field("path", path)
                .field("optional", optional)
                .finish(),
            Step::Select { fields } => f.debug_struct("Select").field("fields", fields).finish(),
            Step::Rename { pairs } => f.debug_struct("Rename").field("pairs", pairs).finish(),
            Step::Over { field, .. } => f.debug_struct("Over").field("field", field).finish(),
            Step::Resolve { field } => f.debug_struct("Resolve").field("field", field).finish(),
            Step::Filter { field, value } => f
                .debug_struct("Filter")
                .field("field", field)
                .field("value", value)
                .finish(),
            Step::Flatten => f.write_str("Flatten"),
            Step::Exclude { fields } => f.debug_struct("Exclude").field("fields", fields).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_omits_over_closure() {
        let step = Step::Over {
            field: "cooldownIndex".into(),
            func: Arc::new(|v| v),
        };
        assert_eq!(format!("{step:?}"), "Over { field: \"cooldownIndex\" }");
    }
}
