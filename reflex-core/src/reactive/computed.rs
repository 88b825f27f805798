//! Computed Values
//!
//! A Computed is a cached derived value that re-evaluates only when read
//! after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. The getter is wrapped in a lazy effect. Nothing runs at creation; the
//!    computed starts dirty.
//!
//! 2. Reading a dirty computed runs the effect, caches the result, and marks
//!    it clean. Reading a clean computed returns the cache.
//!
//! 3. When a dependency changes, the runtime does not re-run the getter. It
//!    marks the computed dirty and adds the readers of the computed's own
//!    synthetic target to the same dispatch, so effects that read the
//!    computed re-run once and pull the fresh value.
//!
//! # Why This Matters
//!
//! - A field changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will re-evaluate
//! - Computeds that are never read stay dirty (no wasted work)
//!
//! # Failure
//!
//! If the getter panics, the previous cached value is kept and the computed
//! stays dirty, so the next read retries.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::effect::{Effect, EffectOptions, StaleHook};
use super::runtime::{Runtime, WeakRuntime};
use super::ObjectId;
use crate::store::FieldKey;

struct ComputedInner<T: 'static> {
    /// Synthetic target standing for "this computed's value".
    target: ObjectId,
    runtime: WeakRuntime,
    effect: Effect<T>,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    evaluations: Cell<usize>,
}

impl<T: 'static> ComputedInner<T> {
    /// Mark dirty. Reports the target only on the clean-to-dirty edge.
    fn mark_dirty(&self) -> Option<ObjectId> {
        if self.dirty.replace(true) {
            None
        } else {
            trace!(computed = %self.target, "marked dirty");
            Some(self.target)
        }
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.release(&self.target);
        }
    }
}

/// A lazily evaluated, memoized derived value.
///
/// Cloning a `Computed` creates a new handle to the **same** cache. Dropping
/// the last handle stops the underlying effect.
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    pub(crate) fn new<F>(runtime: &Runtime, getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|weak: &std::rc::Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let stale: StaleHook = Rc::new(move || weak.upgrade().and_then(|inner| inner.mark_dirty()));
            ComputedInner {
                target: ObjectId::new(),
                runtime: runtime.downgrade(),
                effect: Effect::new(runtime, getter, EffectOptions::lazy().computed(stale)),
                value: RefCell::new(None),
                dirty: Cell::new(true),
                evaluations: Cell::new(0),
            }
        });
        Self { inner }
    }

    /// The current value, re-evaluating the getter first if it is dirty.
    ///
    /// Reading inside an effect makes that effect a dependent of this
    /// computed.
    pub fn get(&self) -> T {
        let inner = &self.inner;

        let cached = if inner.dirty.get() {
            None
        } else {
            inner.value.borrow().clone()
        };
        let value = match cached {
            Some(value) => value,
            None => {
                let value = inner.effect.run();
                *inner.value.borrow_mut() = Some(value.clone());
                inner.dirty.set(false);
                inner.evaluations.set(inner.evaluations.get() + 1);
                value
            }
        };

        if let Some(runtime) = inner.runtime.upgrade() {
            runtime.track(&inner.target, FieldKey::Value);
        }
        value
    }

    /// Whether the next read will re-evaluate the getter.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of times the getter has been evaluated.
    pub fn evaluations(&self) -> usize {
        self.inner.evaluations.get()
    }

    /// The synthetic target readers subscribe to.
    pub fn target(&self) -> ObjectId {
        self.inner.target
    }
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("target", &self.inner.target)
            .field("dirty", &self.is_dirty())
            .field("value", &self.inner.value.borrow())
            .field("evaluations", &self.evaluations())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
