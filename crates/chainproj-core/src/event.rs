//! Chain events, block references, and reindex signals.

use serde::{Deserialize, Serialize};

use crate::value::Value;

// ─── BlockRef ────────────────────────────────────────────────────────────────

/// A minimal reference to a block — enough to track head position and
/// verify parent-hash linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
}

impl BlockRef {
    pub fn new(number: u64, hash: impl Into<String>, parent_hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
            parent_hash: parent_hash.into(),
        }
    }

    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockRef) -> bool {
        self.number == parent.number + 1 && self.parent_hash == parent.hash
    }
}

// ─── ChainEvent ──────────────────────────────────────────────────────────────

/// A decoded contract event as delivered by the source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    /// Contract address that emitted the event.
    pub address: String,
    /// Decoded event type name (e.g. `"constructed"`).
    pub event_type: String,
    /// Ordered, typed event arguments.
    pub args: Vec<Value>,
    /// Block number the event was emitted at.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: String,
    /// Hash of that block's parent.
    pub parent_block_hash: String,
    /// Position of the event within the block, for stable intra-block order.
    pub log_index: u32,
}

impl ChainEvent {
    /// The block this event belongs to.
    pub fn block(&self) -> BlockRef {
        BlockRef::new(
            self.block_number,
            self.block_hash.clone(),
            self.parent_block_hash.clone(),
        )
    }

    /// Argument by position, or `None` if out of range.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

// ─── ReindexSignal ───────────────────────────────────────────────────────────

/// What kind of chain movement a signal reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    /// New canonical block(s) appended to the followed branch.
    NewBlock,
    /// A previously accepted branch was replaced.
    Reorg,
}

/// Drives the reindex coordinator: either new blocks arrived or a branch
/// was abandoned and its range must be recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexSignal {
    pub kind: SignalKind,
    /// First affected block (inclusive).
    pub from_block: u64,
    /// Last affected block (inclusive).
    pub to_block: u64,
    /// Hashes of the blocks invalidated by a reorg (empty for `NewBlock`).
    pub affected_block_hashes: Vec<String>,
}
