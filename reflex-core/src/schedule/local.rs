//! Tokio-backed post-flush scheduling.
//!
//! On a single-threaded tokio runtime, a task spawned with
//! [`tokio::task::spawn_local`] runs the next time the current task yields.
//! That is the same window a host microtask gives: after the synchronous
//! burst of writes, before anything else observes the state.

use std::cell::Cell;
use std::rc::Rc;

use tracing::warn;

use super::{Job, MicrotaskQueue, Scheduler};
use crate::error::ReactiveError;

/// Queues jobs and drains them from one tokio local task per batch.
///
/// # Panics
///
/// `schedule` must be called from within a [`tokio::task::LocalSet`];
/// `spawn_local` panics otherwise.
#[derive(Debug, Clone, Default)]
pub struct LocalTaskScheduler {
    queue: Rc<MicrotaskQueue>,
    armed: Rc<Cell<bool>>,
}

impl LocalTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting for the flush task.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Scheduler for LocalTaskScheduler {
    fn schedule(&self, job: Job) -> Result<(), ReactiveError> {
        self.queue.schedule(job)?;
        if !self.armed.replace(true) {
            let queue = Rc::clone(&self.queue);
            let armed = Rc::clone(&self.armed);
            tokio::task::spawn_local(async move {
                armed.set(false);
                if let Err(err) = queue.flush() {
                    warn!(%err, "post-flush jobs failed");
                }
            });
        }
        Ok(())
    }
}
