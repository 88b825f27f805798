//! Job Scheduling
//!
//! A [`Scheduler`] decides when a deferred [`Job`] runs. The runtime treats
//! the host's "run this soon" facility as an injected strategy, so
//! synchronous and deferred flushing are interchangeable implementations of
//! one contract:
//!
//! - [`SyncScheduler`] runs the job immediately.
//! - [`MicrotaskQueue`] queues the job, coalescing repeats of the same job,
//!   until the host calls [`MicrotaskQueue::flush`].
//! - [`LocalTaskScheduler`] queues the job and lets a tokio local task play
//!   the role of the host microtask.

mod local;
mod queue;

use std::fmt;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::reactive::{EffectId, JobId};

pub use local::LocalTaskScheduler;
pub use queue::MicrotaskQueue;

/// A unit of deferred work.
///
/// Jobs are identified by [`JobId`]; schedulers that batch may treat two
/// jobs with the same ID as one. The owning effect is recorded so failures
/// can be attributed.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    owner: EffectId,
    run: Rc<dyn Fn() -> Result<(), ReactiveError>>,
}

impl Job {
    pub fn new<F>(id: JobId, owner: EffectId, run: F) -> Self
    where
        F: Fn() -> Result<(), ReactiveError> + 'static,
    {
        Self {
            id,
            owner,
            run: Rc::new(run),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn owner(&self) -> EffectId {
        self.owner
    }

    pub fn run(&self) -> Result<(), ReactiveError> {
        (self.run)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Strategy controlling when a job runs.
pub trait Scheduler {
    /// Accept a job. Synchronous strategies return the job's own result;
    /// deferred strategies return `Ok(())` and report failures when they
    /// flush.
    fn schedule(&self, job: Job) -> Result<(), ReactiveError>;
}

/// Runs every job immediately, inside the call to `schedule`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncScheduler;

impl Scheduler for SyncScheduler {
    fn schedule(&self, job: Job) -> Result<(), ReactiveError> {
        job.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn sync_scheduler_runs_immediately() {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let job = Job::new(JobId::new(), EffectId::new(), move || {
            count_clone.set(count_clone.get() + 1);
            Ok(())
        });

        SyncScheduler.schedule(job.clone()).unwrap();
        SyncScheduler.schedule(job).unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn sync_scheduler_returns_job_result() {
        let job = Job::new(JobId::new(), EffectId::new(), || Err(ReactiveError::NotAnObject));
        assert!(matches!(SyncScheduler.schedule(job), Err(ReactiveError::NotAnObject)));
    }
}
