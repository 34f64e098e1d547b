//! Block tracker — a sliding window of recent block references used for
//! parent-hash verification and common-ancestor search during reorgs.

use std::collections::VecDeque;

use chainproj_core::BlockRef;

/// Result of offering a new block to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    /// The block extends the current head; the window was advanced.
    Extended,
    /// The block forks off an earlier block in the window. The window has
    /// been rewound to the ancestor and the new block appended.
    Fork {
        /// The common ancestor both branches share.
        ancestor: BlockRef,
        /// The abandoned blocks, oldest first.
        abandoned: Vec<BlockRef>,
    },
    /// The block's parent is not in the window — the retained history is
    /// too short to recover. The window is left untouched.
    AncestorUnknown,
}

/// Tracks the last N blocks of the followed branch.
pub struct BlockTracker {
    /// Oldest first.
    window: VecDeque<BlockRef>,
    capacity: usize,
}

impl BlockTracker {
    /// `capacity` bounds how deep a reorg can be recovered from.
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Offer a new block.
    pub fn push(&mut self, block: BlockRef) -> PushResult {
        let head = match self.window.back() {
            Some(head) => head.clone(),
            None => {
                self.append(block);
                return PushResult::Extended;
            }
        };
        if block.extends(&head) {
            self.append(block);
            return PushResult::Extended;
        }
        // Fork: find the block the newcomer attaches to.
        let Some(pos) = self.window.iter().rposition(|b| b.hash == block.parent_hash) else {
            return PushResult::AncestorUnknown;
        };
        let ancestor = self.window[pos].clone();
        let abandoned: Vec<BlockRef> = self.window.drain(pos + 1..).collect();
        self.append(block);
        PushResult::Fork {
            ancestor,
            abandoned,
        }
    }

    /// The most recent block of the followed branch.
    pub fn head(&self) -> Option<&BlockRef> {
        self.window.back()
    }

    /// Discard everything after `number`.
    pub fn rewind_to(&mut self, number: u64) {
        while matches!(self.window.back(), Some(b) if b.number > number) {
            self.window.pop_back();
        }
    }

    /// Returns `true` if a block with this hash is in the window.
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.window.iter().any(|b| b.hash == hash)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn append(&mut self, block: BlockRef) {
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(block);
    }
}
