//! Reindex coordinator — the per-branch state machine that decides when
//! entities are stale and what must be recomputed.
//!
//! Recovery never deletes: invalidated blocks get their canonical
//! counterparts re-dispatched, and handler idempotence plus deterministic
//! entity ids make the recomputation overwrite stale state.

use std::collections::{HashMap, HashSet};

use chainproj_core::{BlockRef, ReindexSignal, SignalKind};

use crate::context::CancelFlag;
use crate::error::EngineError;
use crate::tracker::{BlockTracker, PushResult};

/// Where the coordinator is in its follow/recover cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Steady state: new blocks arrive and dispatch in order.
    Following,
    /// A fork was detected; canonical events are being recomputed.
    ReorgRecovery,
    /// No pending re-dispatch work remains. Returns to `Following` on the
    /// next block.
    CaughtUp,
}

/// What the coordinator decided about an incoming block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The block extends the followed branch; dispatch its events.
    Extend,
    /// The block forks the branch. Events on the abandoned blocks are
    /// invalidated; dispatch this block, then keep feeding canonical
    /// blocks until the old head height is re-covered.
    Reorg {
        ancestor: BlockRef,
        abandoned: Vec<BlockRef>,
    },
}

/// Tracks chain head, detects reorganizations, and owns the invalidation
/// and cancellation bookkeeping for in-flight work.
pub struct ReindexCoordinator {
    tracker: BlockTracker,
    state: CoordinatorState,
    /// Hashes of blocks whose derived entities are stale.
    invalidated: HashSet<String>,
    /// Cancel flags of batches currently dispatching, by block hash.
    inflight: HashMap<String, CancelFlag>,
    /// During recovery, the height that must be re-processed up to.
    recover_until: Option<u64>,
}

impl ReindexCoordinator {
    pub fn new(window: usize) -> Self {
        Self {
            tracker: BlockTracker::new(window),
            state: CoordinatorState::Following,
            invalidated: HashSet::new(),
            inflight: HashMap::new(),
            recover_until: None,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Returns `true` if events from this block hash must not produce
    /// entities anymore.
    pub fn is_invalidated(&self, block_hash: &str) -> bool {
        self.invalidated.contains(block_hash)
    }

    /// Feed a new block and decide what to do with it.
    ///
    /// `AncestorUnknown` from the tracker is the one fatal condition: the
    /// fork reaches past the retained window and following this branch
    /// cannot continue safely.
    pub fn observe(&mut self, block: &BlockRef) -> Result<Observation, EngineError> {
        if self.state == CoordinatorState::CaughtUp {
            self.state = CoordinatorState::Following;
        }
        match self.tracker.push(block.clone()) {
            PushResult::Extended => Ok(Observation::Extend),
            PushResult::Fork {
                ancestor,
                abandoned,
            } => {
                let old_head = abandoned.last().map(|b| b.number).unwrap_or(block.number);
                tracing::warn!(
                    at = block.number,
                    ancestor = ancestor.number,
                    depth = abandoned.len(),
                    "Reorg detected, invalidating abandoned branch"
                );
                for dropped in &abandoned {
                    self.invalidate(&dropped.hash);
                }
                self.state = CoordinatorState::ReorgRecovery;
                self.recover_until = Some(old_head.max(block.number));
                Ok(Observation::Reorg {
                    ancestor,
                    abandoned,
                })
            }
            PushResult::AncestorUnknown => Err(EngineError::ReorgAncestorNotFound {
                detected_at: block.number,
                window: self.tracker.capacity(),
            }),
        }
    }

    /// Apply an externally produced signal (chain monitor feed).
    pub fn apply_signal(&mut self, signal: &ReindexSignal) {
        match signal.kind {
            SignalKind::NewBlock => {
                tracing::debug!(
                    from = signal.from_block,
                    to = signal.to_block,
                    "New block signal"
                );
            }
            SignalKind::Reorg => {
                tracing::warn!(
                    from = signal.from_block,
                    to = signal.to_block,
                    hashes = signal.affected_block_hashes.len(),
                    "Reorg signal, invalidating affected blocks"
                );
                for hash in &signal.affected_block_hashes {
                    self.invalidate(hash);
                }
                self.tracker.rewind_to(signal.from_block.saturating_sub(1));
                self.state = CoordinatorState::ReorgRecovery;
                self.recover_until = Some(
                    self.recover_until
                        .map_or(signal.to_block, |u| u.max(signal.to_block)),
                );
            }
        }
    }

    /// Register a batch as in flight and get its cancel flag.
    pub fn begin_batch(&mut self, block: &BlockRef) -> CancelFlag {
        let flag = CancelFlag::new();
        self.inflight.insert(block.hash.clone(), flag.clone());
        flag
    }

    /// Mark a batch finished and advance the state machine.
    pub fn finish_batch(&mut self, block: &BlockRef) {
        self.inflight.remove(&block.hash);
        match self.state {
            CoordinatorState::ReorgRecovery => {
                if self.recover_until.is_some_and(|until| block.number >= until) {
                    tracing::info!(at = block.number, "Reorg recovery complete");
                    self.recover_until = None;
                    self.invalidated.clear();
                    self.state = CoordinatorState::CaughtUp;
                }
            }
            CoordinatorState::Following | CoordinatorState::CaughtUp => {
                self.state = CoordinatorState::CaughtUp;
            }
        }
    }

    fn invalidate(&mut self, hash: &str) {
        self.invalidated.insert(hash.to_string());
        if let Some(flag) = self.inflight.get(hash) {
            flag.cancel();
        }
    }
}
