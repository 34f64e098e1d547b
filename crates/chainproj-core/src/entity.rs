//! Entities — the normalized, typed, identified output of a projection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A flat, persisted record produced by the pipeline's terminal step.
///
/// Identifiers are derived deterministically from source data (an address,
/// a registry index) so that re-running the same input overwrites rather
/// than duplicates. Random ids are never used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type name (e.g. `"Meme"`, `"Listing"`).
    pub entity_type: String,
    /// Stable identifier, unique within the entity type.
    pub id: String,
    /// Flat field name → scalar/array value mapping.
    pub fields: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(
        entity_type: impl Into<String>,
        id: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            fields,
        }
    }

    /// Derive an id from a value, normalizing addresses to lowercase so the
    /// same contract always maps to the same entity.
    pub fn id_from_value(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.to_lowercase()),
            Value::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Read a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_address_is_lowercased() {
        let id = Entity::id_from_value(&Value::from("0xAbCd")).unwrap();
        assert_eq!(id, "0xabcd");
    }

    #[test]
    fn id_from_index() {
        let id = Entity::id_from_value(&Value::Int(42)).unwrap();
        assert_eq!(id, "42");
    }

    #[test]
    fn id_from_map_rejected() {
        assert!(Entity::id_from_value(&Value::map([("a", Value::Null)])).is_none());
    }
}
