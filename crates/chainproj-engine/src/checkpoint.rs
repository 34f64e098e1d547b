//! Checkpoints — persist the engine's position so a restart resumes
//! instead of re-indexing from scratch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use chainproj_core::StoreError;

/// The engine's last durably recorded position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Engine identifier the checkpoint belongs to.
    pub engine_id: String,
    /// Last fully processed block number.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: String,
    /// Unix timestamp of the save.
    pub updated_at: i64,
}

/// Storage contract for checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, engine_id: &str) -> Result<Option<Checkpoint>, StoreError>;
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), StoreError>;
    async fn delete(&self, engine_id: &str) -> Result<(), StoreError>;
}

/// In-memory checkpoint store for tests and ephemeral engines.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, engine_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.data.lock().unwrap().get(engine_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        self.data
            .lock()
            .unwrap()
            .insert(checkpoint.engine_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, engine_id: &str) -> Result<(), StoreError> {
        self.data.lock().unwrap().remove(engine_id);
        Ok(())
    }
}

/// Saves every `interval` blocks, plus forced saves at recovery points.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    engine_id: String,
    interval: u64,
    counter: u64,
}

impl CheckpointManager {
    pub fn new(store: Box<dyn CheckpointStore>, engine_id: impl Into<String>, interval: u64) -> Self {
        Self {
            store,
            engine_id: engine_id.into(),
            interval: interval.max(1),
            counter: 0,
        }
    }

    /// The saved position, if any.
    pub async fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        self.store.load(&self.engine_id).await
    }

    /// Count one processed block and save if the interval elapsed.
    pub async fn maybe_save(&mut self, block_number: u64, block_hash: &str) -> Result<(), StoreError> {
        self.counter += 1;
        if self.counter >= self.interval {
            self.force_save(block_number, block_hash).await?;
            self.counter = 0;
        }
        Ok(())
    }

    /// Save immediately (shutdown, reorg recovery).
    pub async fn force_save(&self, block_number: u64, block_hash: &str) -> Result<(), StoreError> {
        self.store
            .save(Checkpoint {
                engine_id: self.engine_id.clone(),
                block_number,
                block_hash: block_hash.to_string(),
                updated_at: chrono::Utc::now().timestamp(),
            })
            .await
    }
}
