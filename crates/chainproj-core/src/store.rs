//! Entity store contract and the in-memory reference implementation.
//!
//! The store is the only resource mutated across concurrent handler
//! invocations. Conflicting writes to the same `(entity_type, id)` pair are
//! serialized by the store itself; the last write to arrive wins.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::entity::Entity;
use crate::error::StoreError;
use crate::value::Value;

/// Content-keyed CRUD contract consumed by the pipeline's terminal step.
///
/// Both calls are idempotent when given identical arguments. A write with
/// an existing id is an update, not an insert, so `add` and `update`
/// converge on the same upsert semantics.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert or overwrite an entity. Returns the id actually written.
    async fn add(
        &self,
        entity_type: &str,
        id: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<String, StoreError>;

    /// Overwrite the fields of an existing (or new) entity.
    async fn update(
        &self,
        entity_type: &str,
        id: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), StoreError>;

    /// Read an entity back, if present.
    async fn get(&self, entity_type: &str, id: &str) -> Result<Option<Entity>, StoreError>;
}

/// A stored entity plus write bookkeeping used by tests and diagnostics.
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub entity: Entity,
    /// Arrival order of the committed write (monotonically increasing).
    pub sequence: u64,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}

/// In-memory entity store.
///
/// All data is lost when the process exits. Suitable for tests and for
/// ephemeral indexers; durable backends implement [`EntityStore`] the same
/// way.
#[derive(Default)]
pub struct MemoryEntityStore {
    entities: Mutex<HashMap<(String, String), StoredEntity>>,
    next_sequence: Mutex<u64>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&self, entity_type: &str, id: &str, fields: BTreeMap<String, Value>) {
        let sequence = {
            let mut seq = self.next_sequence.lock().unwrap();
            *seq += 1;
            *seq
        };
        let stored = StoredEntity {
            entity: Entity::new(entity_type, id, fields),
            sequence,
            updated_at: chrono::Utc::now().timestamp(),
        };
        let previous = self
            .entities
            .lock()
            .unwrap()
            .insert((entity_type.to_string(), id.to_string()), stored);
        tracing::debug!(
            entity_type,
            id,
            sequence,
            overwrote = previous.is_some(),
            "Entity write committed"
        );
    }

    /// All entities of a type, in id order.
    pub fn entities_of_type(&self, entity_type: &str) -> Vec<Entity> {
        let mut out: Vec<Entity> = self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.entity.entity_type == entity_type)
            .map(|s| s.entity.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Total number of stored entities across all types.
    pub fn len(&self) -> usize {
        self.entities.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.lock().unwrap().is_empty()
    }

    /// Remove an entity. Not called by the engine itself — reorg recovery
    /// overwrites rather than deletes — but available to operator tooling.
    pub fn remove(&self, entity_type: &str, id: &str) -> Option<Entity> {
        self.entities
            .lock()
            .unwrap()
            .remove(&(entity_type.to_string(), id.to_string()))
            .map(|s| s.entity)
    }

    /// The stored record including its write sequence.
    pub fn stored(&self, entity_type: &str, id: &str) -> Option<StoredEntity> {
        self.entities
            .lock()
            .unwrap()
            .get(&(entity_type.to_string(), id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn add(
        &self,
        entity_type: &str,
        id: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<String, StoreError> {
        self.upsert(entity_type, id, fields);
        Ok(id.to_string())
    }

    async fn update(
        &self,
        entity_type: &str,
        id: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        self.upsert(entity_type, id, fields);
        Ok(())
    }

    async fn get(&self, entity_type: &str, id: &str) -> Result<Option<Entity>, StoreError> {
        Ok(self.stored(entity_type, id).map(|s| s.entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, i64)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Int(*v)))
            .collect()
    }

    #[tokio::test]
    async fn add_then_get_roundtrip() {
        let store = MemoryEntityStore::new();
        let id = store.add("Meme", "0xaa", fields(&[("status", 1)])).await.unwrap();
        assert_eq!(id, "0xaa");

        let got = store.get("Meme", "0xaa").await.unwrap().unwrap();
        assert_eq!(got.get("status"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn existing_id_is_update_not_insert() {
        let store = MemoryEntityStore::new();
        store.add("Meme", "0xaa", fields(&[("v", 1)])).await.unwrap();
        store.add("Meme", "0xaa", fields(&[("v", 2)])).await.unwrap();

        assert_eq!(store.len(), 1);
        let got = store.get("Meme", "0xaa").await.unwrap().unwrap();
        assert_eq!(got.get("v"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn last_arrival_wins_by_sequence() {
        let store = MemoryEntityStore::new();
        store.update("Meme", "0xaa", fields(&[("v", 1)])).await.unwrap();
        let first = store.stored("Meme", "0xaa").unwrap().sequence;
        store.update("Meme", "0xaa", fields(&[("v", 2)])).await.unwrap();
        let second = store.stored("Meme", "0xaa").unwrap().sequence;
        assert!(second > first);
    }

    #[tokio::test]
    async fn entities_of_type_sorted_by_id() {
        let store = MemoryEntityStore::new();
        store.add("Listing", "2", fields(&[])).await.unwrap();
        store.add("Listing", "1", fields(&[])).await.unwrap();
        store.add("Meme", "0xaa", fields(&[])).await.unwrap();

        let listings = store.entities_of_type("Listing");
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, "1");
    }
}
