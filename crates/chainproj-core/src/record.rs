//! Source records — immutable snapshots of contract storage or decoded
//! event arguments at a specific block.
//!
//! A record is a tree of [`Value`]s. The pipeline only ever reads it;
//! `Arc` sharing lets many concurrent runs borrow the same snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::value::Value;

/// One read of on-chain storage (or one event's arguments) at a block.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    root: Arc<Value>,
}

impl SourceRecord {
    /// Wrap a value tree. Non-map roots are permitted but most pipelines
    /// start with a `get` that expects a map.
    pub fn new(root: Value) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// Build a record from top-level `(name, value)` pairs.
    pub fn from_fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(Value::map(fields))
    }

    /// The root value of the snapshot.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Look up a named subtree of the root.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.root.as_map().and_then(|m| m.get(path))
    }
}

/// Splits a collection-shaped value into its element maps.
///
/// Two shapes expand: an array of maps (contract array storage) and a map
/// of maps (index-keyed mapping storage, expanded in key order). Anything
/// else yields a single element so scalar subtrees still flow through the
/// pipeline as one record.
pub fn expand_collection(value: &Value) -> Vec<BTreeMap<String, Value>> {
    match value {
        Value::Array(elems) => elems.iter().map(element_fields).collect(),
        Value::Map(entries) if entries.values().all(|v| v.as_map().is_some()) && !entries.is_empty() => {
            entries.values().map(element_fields).collect()
        }
        other => vec![element_fields(other)],
    }
}

fn element_fields(value: &Value) -> BTreeMap<String, Value> {
    match value {
        Value::Map(m) => m.clone(),
        other => {
            // Scalar element: wrap under a conventional field name.
            let mut m = BTreeMap::new();
            m.insert("value".to_string(), other.clone());
            m
        }
    }
}
