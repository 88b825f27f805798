//! Effect Implementation
//!
//! An Effect is a re-runnable computation whose field reads are tracked.
//!
//! # How Effects Work
//!
//! 1. Unless created lazily, the effect runs its function immediately to
//!    establish initial dependencies.
//!
//! 2. When any dependency changes, the effect is re-run, or handed to its
//!    scheduler if it has one.
//!
//! 3. Before re-running, the effect removes itself from every dependency set
//!    it belongs to. A run that no longer reads a field stops being notified
//!    about it.
//!
//! # Membership
//!
//! Each effect keeps the list of dependency sets it currently belongs to.
//! This list always equals the set of deps that contain the effect: `track`
//! adds to both sides, cleanup removes from both sides.
//!
//! Dependency sets hold effects weakly. The [`Effect`] handle owns the
//! effect, and dropping the last handle unsubscribes it everywhere.
//!
//! # Failure
//!
//! If the function panics, the context frame is popped while unwinding and
//! the panic continues to the caller of [`Effect::run`]. During dispatch the
//! runtime catches it and reports it as an [`EffectFailure`].
//!
//! [`EffectFailure`]: crate::error::EffectFailure

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::runtime::{Reactive, Runtime, WeakRuntime};
use super::{EffectId, ObjectId};
use crate::error::ReactiveError;
use crate::store::Dep;

/// Strategy invoked instead of a direct re-run when a dependency changes.
///
/// The scheduler decides if and when to call [`EffectRef::run`].
pub type EffectScheduler = Rc<dyn Fn(&EffectRef) -> Result<(), ReactiveError>>;

/// Marks a computed's cache dirty. Returns the computed's synthetic target
/// when the cache was clean, `None` when it was already dirty.
pub(crate) type StaleHook = Rc<dyn Fn() -> Option<ObjectId>>;

/// Options for [`Runtime::effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run at creation; the first [`Effect::run`] establishes
    /// dependencies.
    pub lazy: bool,
    pub scheduler: Option<EffectScheduler>,
    /// Set for the effect behind a computed; never re-run by dispatch.
    pub(crate) stale: Option<StaleHook>,
}

impl EffectOptions {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }

    pub fn with_scheduler(mut self, scheduler: EffectScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub(crate) fn computed(mut self, stale: StaleHook) -> Self {
        self.stale = Some(stale);
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("computed", &self.stale.is_some())
            .finish()
    }
}

struct EffectInner<T> {
    id: EffectId,
    runtime: WeakRuntime,
    run: Rc<dyn Fn() -> T>,
    deps: RefCell<SmallVec<[Weak<Dep>; 4]>>,
    scheduler: Option<EffectScheduler>,
    stale: Option<StaleHook>,
    active: Cell<bool>,
    run_count: Cell<usize>,
}

impl<T> EffectInner<T> {
    /// Leave every dependency set this effect belongs to.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps.iter().filter_map(Weak::upgrade) {
            dep.unsubscribe(self.id);
        }
        if !deps.is_empty() {
            trace!(effect = %self.id, released = deps.len(), "cleanup");
        }
    }
}

impl<T: 'static> Reactive for EffectInner<T> {
    fn effect_id(&self) -> EffectId {
        self.id
    }

    fn rerun(self: Rc<Self>) {
        Effect { inner: self }.run();
    }

    fn scheduler(&self) -> Option<EffectScheduler> {
        self.scheduler.clone()
    }

    fn record_dependency(&self, dep: &Rc<Dep>) {
        self.deps.borrow_mut().push(Rc::downgrade(dep));
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn is_computed(&self) -> bool {
        self.stale.is_some()
    }

    fn mark_stale(&self) -> Option<ObjectId> {
        self.stale.as_ref().and_then(|stale| stale())
    }

    fn run_count(&self) -> usize {
        self.run_count.get()
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// A tracked, re-runnable computation producing `T`.
///
/// The handle is the effect's runner: [`run`](Effect::run) re-executes the
/// function with fresh dependency tracking and returns its result. Cloning
/// shares the same effect.
pub struct Effect<T: 'static> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    pub(crate) fn new<F>(runtime: &Runtime, run: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let effect = Self {
            inner: Rc::new(EffectInner {
                id: EffectId::new(),
                runtime: runtime.downgrade(),
                run: Rc::new(run),
                deps: RefCell::new(SmallVec::new()),
                scheduler: options.scheduler,
                stale: options.stale,
                active: Cell::new(true),
                run_count: Cell::new(0),
            }),
        };

        if !options.lazy {
            effect.run();
        }

        effect
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Execute the function with fresh dependency tracking.
    ///
    /// A stopped effect, or one whose runtime is gone, evaluates the
    /// function without tracking anything.
    pub fn run(&self) -> T {
        let inner = &self.inner;
        let run = Rc::clone(&inner.run);

        let runtime = match inner.runtime.upgrade() {
            Some(runtime) if inner.active.get() => runtime,
            _ => return run(),
        };

        inner.cleanup();
        inner.run_count.set(inner.run_count.get() + 1);
        debug!(effect = %inner.id, run = inner.run_count.get(), "running effect");

        let _guard = runtime.context().enter(self.as_reactive());
        run()
    }

    /// Unsubscribe from everything and stop reacting to changes.
    pub fn stop(&self) {
        if self.inner.active.replace(false) {
            self.inner.cleanup();
            debug!(effect = %self.inner.id, "stopped effect");
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Get the number of times the effect has run with tracking.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of dependency sets the effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn as_reactive(&self) -> Rc<dyn Reactive> {
        self.inner.clone()
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// A non-owning reference to an [`Effect`].
pub struct WeakEffect<T: 'static> {
    inner: Weak<EffectInner<T>>,
}

impl<T: 'static> WeakEffect<T> {
    pub fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

impl<T: 'static> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for WeakEffect<T> {
    fn default() -> Self {
        Self { inner: Weak::new() }
    }
}

/// Type-erased handle passed to an [`EffectScheduler`].
#[derive(Clone)]
pub struct EffectRef {
    effect: Rc<dyn Reactive>,
}

impl EffectRef {
    pub(crate) fn new(effect: Rc<dyn Reactive>) -> Self {
        Self { effect }
    }

    pub fn id(&self) -> EffectId {
        self.effect.effect_id()
    }

    /// Re-run the effect now, discarding its result.
    pub fn run(&self) {
        Rc::clone(&self.effect).rerun();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

impl fmt::Debug for EffectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectRef").field(&self.id()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
