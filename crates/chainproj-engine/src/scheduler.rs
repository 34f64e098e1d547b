//! Dispatch scheduling — per-address ordering with cross-address
//! parallelism.
//!
//! Events for one contract address carry causal entity-update order, so a
//! group runs strictly in `(block_number, log_index)` sequence. Groups for
//! different addresses run concurrently, bounded by the worker limit.

use std::collections::BTreeMap;
use std::sync::Mutex;

use futures::stream::{self, StreamExt};

use chainproj_core::ChainEvent;

use crate::context::EventContext;
use crate::error::EngineError;
use crate::handler::{DispatchOutcome, HandlerRegistry};

/// What happened to one batch of events.
#[derive(Debug, Default)]
pub struct BatchStats {
    /// Events routed to a handler that completed.
    pub handled: usize,
    /// Events dropped for lack of a registered handler.
    pub unregistered: usize,
    /// Events skipped because their batch was cancelled mid-flight.
    pub cancelled: usize,
    /// Handler failures. These never abort sibling events.
    pub errors: Vec<EngineError>,
}

/// Bounded-concurrency event scheduler.
pub struct Scheduler {
    max_workers: usize,
}

impl Scheduler {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Dispatch one block's events.
    ///
    /// Handler errors are collected per event and reported in the stats;
    /// an error in one address group never stops the others.
    pub async fn dispatch_batch(
        &self,
        registry: &HandlerRegistry,
        events: Vec<ChainEvent>,
        ctx: &EventContext,
    ) -> BatchStats {
        let mut groups: BTreeMap<String, Vec<ChainEvent>> = BTreeMap::new();
        for event in events {
            groups
                .entry(event.address.to_lowercase())
                .or_default()
                .push(event);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|e| (e.block_number, e.log_index));
        }

        let stats = Mutex::new(BatchStats::default());
        stream::iter(groups.into_values())
            .for_each_concurrent(self.max_workers, |group| {
                let stats = &stats;
                async move {
                    for event in group {
                        if ctx.is_cancelled() {
                            stats.lock().unwrap().cancelled += 1;
                            continue;
                        }
                        match registry.dispatch(&event, ctx).await {
                            Ok(DispatchOutcome::Handled) => {
                                stats.lock().unwrap().handled += 1;
                            }
                            Ok(DispatchOutcome::Unregistered) => {
                                stats.lock().unwrap().unregistered += 1;
                            }
                            Err(err) => {
                                tracing::warn!(
                                    event_type = %event.event_type,
                                    address = %event.address,
                                    block = event.block_number,
                                    error = %err,
                                    "Handler failed"
                                );
                                stats.lock().unwrap().errors.push(err);
                            }
                        }
                    }
                }
            })
            .await;
        stats.into_inner().unwrap()
    }
}
