//! Deferred job queue.
//!
//! The queue is the batching window between a burst of synchronous writes
//! and the host's next microtask boundary. Scheduling the same job twice
//! before a flush keeps one entry at its first position, so a watcher that
//! is triggered several times reacts once per flush.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::{Job, Scheduler};
use crate::error::{EffectFailure, ReactiveError};
use crate::reactive::JobId;

/// Upper bound on follow-up rounds within a single flush. A job that keeps
/// re-queueing itself is left pending once this is reached.
const MAX_FLUSH_ROUNDS: usize = 100;

/// A coalescing FIFO of deferred jobs.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
    pending: RefCell<IndexMap<JobId, Job>>,
    flushing: Cell<bool>,
}

struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct jobs waiting for the next flush.
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Run every pending job, in the order first queued.
    ///
    /// Jobs queued while flushing run in a follow-up round of the same call.
    /// A panicking job does not stop the others; all failures are returned
    /// together. Calling `flush` from inside a job is a no-op, since the
    /// outer call drains the queue anyway.
    ///
    /// Returns the number of jobs run.
    pub fn flush(&self) -> Result<usize, ReactiveError> {
        if self.flushing.replace(true) {
            return Ok(0);
        }
        let _guard = FlushGuard(&self.flushing);

        let mut ran = 0;
        let mut failures = Vec::new();

        for _ in 0..MAX_FLUSH_ROUNDS {
            let batch = std::mem::take(&mut *self.pending.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for job in batch.into_values() {
                ran += 1;
                match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => failures.extend(err.into_failures(job.owner())),
                    Err(payload) => failures.push(EffectFailure::from_panic(job.owner(), payload)),
                }
            }
        }

        if !self.is_empty() {
            warn!(pending = self.len(), "post-flush jobs kept re-queueing; deferring the rest");
        }
        debug!(ran, failed = failures.len(), "flushed post jobs");

        if failures.is_empty() {
            Ok(ran)
        } else {
            Err(ReactiveError::Dispatch(failures))
        }
    }
}

impl Scheduler for MicrotaskQueue {
    fn schedule(&self, job: Job) -> Result<(), ReactiveError> {
        self.pending.borrow_mut().entry(job.id()).or_insert(job);
        Ok(())
    }
}
