//! Fluent pipeline construction.
//!
//! # Example
//!
//! ```rust
//! use chainproj_pipeline::Pipeline;
//! use chainproj_core::Value;
//!
//! let pipeline = Pipeline::new()
//!     .get("kitties")
//!     .select_fields(["index", "genes", "cooldownIndex"])
//!     .rename([("index", "id")])
//!     .filter("genes", Value::Int(7));
//! ```

use std::sync::Arc;

use chainproj_core::Value;

use crate::step::{OverFn, Step};

/// An ordered, immutable sequence of projection steps.
///
/// A pipeline is a template, not a computation: construction performs no
/// I/O, and the same pipeline can be run over many source records. Every
/// builder method consumes `self`, so a constructed pipeline can never be
/// mutated through this API.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend into a named subtree; absent path fails with `PathNotFound`.
    pub fn get(mut self, path: impl Into<String>) -> Self {
        self.steps.push(Step::Get {
            path: path.into(),
            optional: false,
        });
        self
    }

    /// Descend into a named subtree; absent path drops the record silently.
    pub fn get_optional(mut self, path: impl Into<String>) -> Self {
        self.steps.push(Step::Get {
            path: path.into(),
            optional: true,
        });
        self
    }

    /// Project to a subset of fields.
    pub fn select_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(Step::Select {
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Rename fields; later steps address them by the new name.
    pub fn rename<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        self.steps.push(Step::Rename {
            pairs: pairs
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        });
        self
    }

    /// Apply a pure transformation to one field's value.
    pub fn over<F>(mut self, field: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.steps.push(Step::Over {
            field: field.into(),
            func: Arc::new(func) as OverFn,
        });
        self
    }

    /// Mark a field as a content reference to be resolved externally.
    pub fn resolve(mut self, field: impl Into<String>) -> Self {
        self.steps.push(Step::Resolve {
            field: field.into(),
        });
        self
    }

    /// Drop records whose field does not equal `value`.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.steps.push(Step::Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Merge one level of nested maps into the parent field namespace.
    pub fn flatten(mut self) -> Self {
        self.steps.push(Step::Flatten);
        self
    }

    /// Remove a subset of fields.
    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(Step::Exclude {
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// The ordered step list.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}
