//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observable objects,
//! computed values, watchers, and effects. It owns the dependency store and
//! the active-effect stack, and it implements the two primitives everything
//! else is built on.
//!
//! # How It Works
//!
//! 1. `track(target, key)`: if an effect is running, subscribe it to the
//!    `(target, key)` dep and record the dep in the effect's membership list.
//!
//! 2. `trigger(target, key, op)`:
//!    a. Snapshot the members of the `(target, key)` dep
//!    b. For `Add`/`Delete`, fold in the target's enumeration dep
//!    c. Drop the currently running effect from the snapshot
//!    d. Mark every computed in the snapshot dirty and fold in the readers
//!       of its synthetic target, repeating for computeds found there
//!    e. Hand each effect to its scheduler, or re-run it directly
//!
//! The snapshot is taken before any effect runs. Re-running an effect
//! unsubscribes and re-subscribes it, which mutates the live dep.
//! Propagating staleness first means an effect reading several computeds
//! over the same field re-runs once and sees every one of them fresh.
//!
//! # Ownership
//!
//! There is no process-global state: every handle carries the runtime that
//! created it. Handles hold the runtime weakly, so dropping the last
//! `Runtime` releases the store even while effects that captured handles
//! are still subscribed. Reads and writes through handles of a dropped
//! runtime behave like plain field access.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::computed::Computed;
use super::context::Context;
use super::effect::{Effect, EffectOptions, EffectRef, EffectScheduler};
use super::observable::Observable;
use super::watch::{WatchHandle, WatchOptions, WatchSource};
use super::{EffectId, ObjectId, OnInvalidate};
use crate::config::{DispatchPolicy, RuntimeConfig};
use crate::error::{EffectFailure, ReactiveError};
use crate::schedule::{MicrotaskQueue, Scheduler};
use crate::store::{Dep, DependencyStore, FieldKey, TrackTarget, TriggerOp};
use crate::value::{RawObject, Value};

/// A computation that can be subscribed to dependency sets.
///
/// Implemented by effects; dependency sets hold subscribers through this
/// trait so they do not need to know the effect's value type.
pub(crate) trait Reactive {
    /// Get the effect ID used as the subscription key.
    fn effect_id(&self) -> EffectId;

    /// Re-run the computation, discarding its result.
    fn rerun(self: Rc<Self>);

    /// The scheduler that takes over re-runs, if one was supplied.
    fn scheduler(&self) -> Option<EffectScheduler>;

    /// Record membership in `dep`. Called after `dep` accepted the effect.
    fn record_dependency(&self, dep: &Rc<Dep>);

    /// False once the effect has been stopped.
    fn is_active(&self) -> bool;

    /// Computed effects are never re-run by dispatch.
    fn is_computed(&self) -> bool;

    /// Mark a computed dirty. Returns its synthetic target if it was clean.
    fn mark_stale(&self) -> Option<ObjectId>;

    /// Number of tracked runs so far.
    fn run_count(&self) -> usize;
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    context: Context,
    store: RefCell<DependencyStore>,
    post_queue: Rc<MicrotaskQueue>,
    post_scheduler: RefCell<Rc<dyn Scheduler>>,
}

/// The reactive runtime.
///
/// Cloning a `Runtime` creates a new handle to the **same** runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning reference held by handles.
#[derive(Clone)]
pub(crate) struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let post_queue = Rc::new(MicrotaskQueue::new());
        let post_scheduler: Rc<dyn Scheduler> = post_queue.clone();
        Self {
            inner: Rc::new(RuntimeInner {
                store: RefCell::new(DependencyStore::new(config.sweep_threshold)),
                config,
                context: Context::default(),
                post_queue,
                post_scheduler: RefCell::new(post_scheduler),
            }),
        }
    }

    /// Replace the strategy used for `Flush::Post` watchers.
    ///
    /// Watchers capture the scheduler when they are created; install it
    /// before creating them.
    pub fn with_post_scheduler(self, scheduler: Rc<dyn Scheduler>) -> Self {
        *self.inner.post_scheduler.borrow_mut() = scheduler;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn post_scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.inner.post_scheduler.borrow())
    }

    /// Drain the built-in post-flush queue.
    ///
    /// This is the host's microtask boundary when no other post scheduler was
    /// installed. Returns the number of jobs run.
    pub fn flush_post_jobs(&self) -> Result<usize, ReactiveError> {
        self.inner.post_queue.flush()
    }

    // ------------------------------------------------------------------
    // Constructors for reactive handles
    // ------------------------------------------------------------------

    /// Wrap a raw object so reads are tracked and writes trigger.
    pub fn wrap(&self, raw: RawObject) -> Observable {
        Observable::new(raw, self.downgrade())
    }

    /// Create an effect that runs `f` now and again whenever a field it
    /// read changes.
    pub fn effect<T, F>(&self, f: F) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        self.effect_with(f, EffectOptions::default())
    }

    pub fn effect_with<T, F>(&self, f: F, options: EffectOptions) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        Effect::new(self, f, options)
    }

    /// Create a lazily evaluated, cached derived value.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new(self, getter)
    }

    /// Observe `source` and call `callback(new, old, on_invalidate)` after
    /// it changes.
    pub fn watch<C>(&self, source: impl Into<WatchSource>, callback: C, options: WatchOptions) -> WatchHandle
    where
        C: FnMut(&Value, &Value, &OnInvalidate) + 'static,
    {
        WatchHandle::new(self, source.into(), callback, options)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Record that the running effect depends on `(target, key)`.
    ///
    /// A no-op when no effect is running or tracking is paused.
    pub fn track(&self, target: &(impl TrackTarget + ?Sized), key: FieldKey) {
        let Some(effect) = self.inner.context.current() else {
            return;
        };

        if self.inner.store.borrow().needs_sweep() {
            self.sweep();
        }

        let dep = self.inner.store.borrow_mut().dep_for(target, key);
        if dep.subscribe(Rc::clone(&effect)) {
            effect.record_dependency(&dep);
            trace!(effect = %effect.effect_id(), object = %dep.target(), key = %dep.key(), "track");
        }
    }

    /// Re-run, or hand to their schedulers, the effects that depend on
    /// `(target, key)`.
    ///
    /// Computeds reached by the write are all marked dirty before any effect
    /// runs, and their readers join the same batch. Effects run in
    /// first-subscription order, direct subscribers ahead of readers reached
    /// through computeds, and each effect runs at most once per trigger.
    ///
    /// Failures are handled according to [`RuntimeConfig::dispatch`].
    pub fn trigger(
        &self,
        target: &(impl TrackTarget + ?Sized),
        key: FieldKey,
        op: TriggerOp,
    ) -> Result<(), ReactiveError> {
        let id = target.target_id();
        let mut pending: IndexMap<EffectId, Rc<dyn Reactive>> = IndexMap::new();
        self.snapshot_into(id, &key, &mut pending);
        if op.changes_keys() {
            self.snapshot_into(id, &FieldKey::Iterate, &mut pending);
        }
        if pending.is_empty() {
            return Ok(());
        }

        trace!(object = %id, %key, ?op, effects = pending.len(), "trigger");

        let current = self.inner.context.current_id();
        let mut effects: IndexMap<EffectId, Rc<dyn Reactive>> = IndexMap::new();
        let mut next = 0;
        while next < pending.len() {
            let Some((&effect_id, effect)) = pending.get_index(next) else {
                break;
            };
            let effect = Rc::clone(effect);
            next += 1;
            if Some(effect_id) == current || !effect.is_active() {
                continue;
            }
            if !effect.is_computed() {
                effects.entry(effect_id).or_insert(effect);
                continue;
            }
            if let Some(derived) = effect.mark_stale() {
                let mut readers = IndexMap::new();
                self.snapshot_into(derived, &FieldKey::Value, &mut readers);
                for (reader_id, reader) in readers {
                    pending.entry(reader_id).or_insert(reader);
                }
            }
        }

        let batch = effects
            .into_values()
            .map(|effect| {
                let runs = effect.run_count();
                (effect, runs)
            })
            .collect();
        self.dispatch(batch)
    }

    fn snapshot_into(&self, id: ObjectId, key: &FieldKey, work: &mut IndexMap<EffectId, Rc<dyn Reactive>>) {
        if let Some(dep) = self.inner.store.borrow().lookup(id, key) {
            dep.snapshot_into(work);
        }
    }

    fn dispatch(&self, batch: Vec<(Rc<dyn Reactive>, usize)>) -> Result<(), ReactiveError> {
        let mut failures = Vec::new();

        for (effect, runs_at_snapshot) in batch {
            // Stopped by an earlier effect in this batch.
            if !effect.is_active() {
                continue;
            }
            // Already re-ran after the write, from a nested trigger.
            if effect.run_count() != runs_at_snapshot {
                continue;
            }

            let id = effect.effect_id();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match effect.scheduler() {
                Some(scheduler) => scheduler(&EffectRef::new(Rc::clone(&effect))),
                None => {
                    Rc::clone(&effect).rerun();
                    Ok(())
                }
            }));

            let failed = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.into_failures(id),
                Err(payload) => vec![EffectFailure::from_panic(id, payload)],
            };
            for failure in &failed {
                warn!(effect = %failure.effect, message = %failure.message, "effect failed during dispatch");
            }
            failures.extend(failed);

            if self.inner.config.dispatch == DispatchPolicy::Abort {
                break;
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReactiveError::Dispatch(failures))
        }
    }

    /// Run `f` with tracking paused. Reads inside `f` subscribe nothing.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.context.pause();
        f()
    }

    /// Check if reads are currently being attributed to an effect.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// The effect reads are currently attributed to, if any.
    pub fn active_effect(&self) -> Option<EffectId> {
        self.inner.context.current_id()
    }

    // ------------------------------------------------------------------
    // Store lifetime
    // ------------------------------------------------------------------

    /// Evict every dependency registered for `target`.
    ///
    /// Effects subscribed only through this target become unreachable from
    /// the store. Returns false if nothing was registered.
    pub fn release(&self, target: &(impl TrackTarget + ?Sized)) -> bool {
        let evicted = self.inner.store.borrow_mut().release(target.target_id());
        evicted.is_some()
    }

    /// Evict entries whose objects have been dropped. Returns how many.
    pub fn sweep(&self) -> usize {
        let evicted = self.inner.store.borrow_mut().sweep();
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "swept dependency store");
        }
        evicted.len()
    }

    /// Number of targets with registered dependencies.
    pub fn tracked_targets(&self) -> usize {
        self.inner.store.borrow().target_count()
    }

    /// Number of effects subscribed to `(target, key)`.
    pub fn subscriber_count(&self, target: &(impl TrackTarget + ?Sized), key: &FieldKey) -> usize {
        self.inner.store.borrow().subscriber_count(target.target_id(), key)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("tracked_targets", &self.tracked_targets())
            .field("stack_depth", &self.inner.context.depth())
            .field("pending_post_jobs", &self.inner.post_queue.len())
            .finish()
    }
}
