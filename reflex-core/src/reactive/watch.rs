//! Watchers
//!
//! A watcher observes a source and calls a user callback with the new and
//! previous value each time the source reacts to a change.
//!
//! # How Watchers Work
//!
//! 1. The source becomes the getter of a lazy effect. A deep source reads
//!    every field reachable from the watched object (see [`traverse`]).
//!
//! 2. The effect's scheduler runs the watcher's job, either synchronously
//!    inside `trigger` ([`Flush::Sync`]) or through the runtime's post
//!    scheduler ([`Flush::Post`]).
//!
//! 3. The job re-runs the getter, fires the invalidation registered by the
//!    previous callback, calls `callback(new, old, on_invalidate)`, and then
//!    remembers `new` as the next `old`.
//!
//! # Invalidation
//!
//! The callback receives an [`OnInvalidate`] capability. A cleanup
//! registered through it runs before the next callback, or when the watcher
//! is stopped. It is how a callback discards results of asynchronous work
//! that a later change superseded.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::effect::{Effect, EffectOptions, EffectRef, EffectScheduler, WeakEffect};
use super::observable::Observable;
use super::runtime::Runtime;
use super::{JobId, ObjectId};
use crate::schedule::Job;
use crate::value::Value;

/// When a triggered watcher runs its callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flush {
    /// Inside the `trigger` that caused the change.
    #[default]
    Sync,
    /// At the next flush of the runtime's post scheduler.
    Post,
}

/// Options for [`Runtime::watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call the callback once at setup, with an undefined old value.
    pub immediate: bool,
    pub flush: Flush,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Self::default()
        }
    }

    pub fn post() -> Self {
        Self {
            flush: Flush::Post,
            ..Self::default()
        }
    }
}

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    /// An explicit getter; its tracked reads decide when the watcher fires.
    Getter(Rc<dyn Fn() -> Value>),
    /// Every field reachable from an object. The watched value is the
    /// object itself.
    Deep(Observable),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        WatchSource::Getter(Rc::new(f))
    }

    fn into_getter(self) -> Rc<dyn Fn() -> Value> {
        match self {
            WatchSource::Getter(getter) => getter,
            WatchSource::Deep(target) => Rc::new(move || {
                traverse(&target);
                Value::from(&target)
            }),
        }
    }
}

impl From<Observable> for WatchSource {
    fn from(target: Observable) -> Self {
        WatchSource::Deep(target)
    }
}

impl From<&Observable> for WatchSource {
    fn from(target: &Observable) -> Self {
        WatchSource::Deep(target.clone())
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Getter(_) => f.write_str("Getter(..)"),
            WatchSource::Deep(target) => f.debug_tuple("Deep").field(&target.id()).finish(),
        }
    }
}

/// Registration point for a watcher's invalidation cleanup.
///
/// Only the most recently registered cleanup is kept. It runs at most once.
#[derive(Clone, Default)]
pub struct OnInvalidate {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnInvalidate {
    /// Run `f` before the next callback, or when the watcher stops.
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        *self.slot.borrow_mut() = Some(Box::new(f));
    }

    /// Whether a cleanup is waiting to run.
    pub fn is_pending(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub(crate) fn fire(&self) {
        let pending = self.slot.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

impl fmt::Debug for OnInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnInvalidate")
            .field("pending", &self.is_pending())
            .finish()
    }
}

type Callback = Box<dyn FnMut(&Value, &Value, &OnInvalidate)>;

struct WatcherState {
    job_id: JobId,
    effect: RefCell<WeakEffect<Value>>,
    old: RefCell<Value>,
    invalidate: OnInvalidate,
    callback: RefCell<Callback>,
}

impl WatcherState {
    fn job(&self) {
        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            warn!(job = %self.job_id, "watcher re-triggered from its own callback; skipping");
            return;
        };
        let Some(effect) = self.effect.borrow().upgrade() else {
            return;
        };
        // Stopped while the job was queued.
        if !effect.is_active() {
            return;
        }

        let new = effect.run();
        self.invalidate.fire();
        let old = self.old.borrow().clone();
        callback(&new, &old, &self.invalidate);
        *self.old.borrow_mut() = new;
    }
}

/// Handle to a running watcher.
///
/// The handle owns the watcher: dropping it has the same effect as
/// [`stop`](WatchHandle::stop).
pub struct WatchHandle {
    effect: Effect<Value>,
    state: Rc<WatcherState>,
}

impl WatchHandle {
    pub(crate) fn new<C>(runtime: &Runtime, source: WatchSource, callback: C, options: WatchOptions) -> Self
    where
        C: FnMut(&Value, &Value, &OnInvalidate) + 'static,
    {
        let state = Rc::new(WatcherState {
            job_id: JobId::new(),
            effect: RefCell::new(WeakEffect::default()),
            old: RefCell::new(Value::Undefined),
            invalidate: OnInvalidate::default(),
            callback: RefCell::new(Box::new(callback)),
        });

        let scheduler: EffectScheduler = match options.flush {
            Flush::Sync => {
                let state = Rc::clone(&state);
                Rc::new(move |_: &EffectRef| {
                    state.job();
                    Ok(())
                })
            }
            Flush::Post => {
                let state = Rc::clone(&state);
                let post = runtime.post_scheduler();
                Rc::new(move |effect: &EffectRef| {
                    let state = Rc::clone(&state);
                    post.schedule(Job::new(state.job_id, effect.id(), move || {
                        state.job();
                        Ok(())
                    }))
                })
            }
        };

        let getter = source.into_getter();
        let effect = Effect::new(
            runtime,
            move || getter(),
            EffectOptions::lazy().with_scheduler(scheduler),
        );
        *state.effect.borrow_mut() = effect.downgrade();

        if options.immediate {
            state.job();
        } else {
            *state.old.borrow_mut() = effect.run();
        }
        debug!(effect = %effect.id(), job = %state.job_id, flush = ?options.flush, "watcher started");

        Self { effect, state }
    }

    /// Stop reacting, run any pending invalidation, and discard queued jobs.
    pub fn stop(&self) {
        self.effect.stop();
        self.state.invalidate.fire();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    /// The value passed as `new` to the latest callback, or the initial
    /// value if the callback has not run yet.
    pub fn last_value(&self) -> Value {
        self.state.old.borrow().clone()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.effect)
            .field("job", &self.state.job_id)
            .field("last_value", &self.state.old.borrow())
            .finish()
    }
}

/// Read every field reachable from `target` so the running effect depends on
/// the whole subtree.
///
/// Each object is visited once, so cyclic graphs terminate.
pub fn traverse(target: &Observable) {
    let mut seen = HashSet::new();
    traverse_into(target, &mut seen);
}

fn traverse_into(target: &Observable, seen: &mut HashSet<ObjectId>) {
    if !seen.insert(target.id()) {
        return;
    }
    for key in target.keys() {
        if let Some(child) = target.child(&key) {
            traverse_into(&child, seen);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
