//! Dependency Store
//!
//! Maps each tracked target to its per-key dependency sets:
//! `ObjectId -> FieldKey -> Dep`.
//!
//! # Lifetime Policy
//!
//! The store never owns a raw object, and dependency sets hold effects
//! weakly, so nothing the store reaches keeps an object alive. An object
//! captured by an effect's closure lives as long as that effect's handles.
//! Each entry keeps a weak liveness handle of the object it was created for,
//! and entries are evicted:
//!
//! 1. explicitly, by `release`,
//! 2. by `sweep`, for every entry whose object has been dropped,
//! 3. automatically, once enough new entries accumulate (the runtime calls
//!    `sweep` when `needs_sweep` reports true).
//!
//! Synthetic targets (computed values) have no liveness handle and are only
//! released explicitly.

use std::collections::HashMap;
use std::rc::Rc;

use super::dep::{Dep, FieldKey};
use crate::reactive::ObjectId;
use crate::value::{RawObject, WeakObject};

/// Anything that can be tracked: it has a stable identity and, optionally, a
/// weak handle the store can use to detect that it is gone.
pub trait TrackTarget {
    fn target_id(&self) -> ObjectId;

    fn liveness(&self) -> Option<WeakObject> {
        None
    }
}

impl TrackTarget for ObjectId {
    fn target_id(&self) -> ObjectId {
        *self
    }
}

impl TrackTarget for RawObject {
    fn target_id(&self) -> ObjectId {
        self.id()
    }

    fn liveness(&self) -> Option<WeakObject> {
        Some(self.downgrade())
    }
}

/// The dependency sets registered for one target.
pub(crate) struct TargetEntry {
    liveness: Option<WeakObject>,
    deps: HashMap<FieldKey, Rc<Dep>>,
}

impl TargetEntry {
    fn is_dead(&self) -> bool {
        self.liveness.as_ref().is_some_and(|object| !object.is_alive())
    }
}

pub(crate) struct DependencyStore {
    entries: HashMap<ObjectId, TargetEntry>,
    created_since_sweep: usize,
    sweep_threshold: usize,
}

impl DependencyStore {
    pub(crate) fn new(sweep_threshold: usize) -> Self {
        Self {
            entries: HashMap::new(),
            created_since_sweep: 0,
            sweep_threshold,
        }
    }

    /// Locate or create the dep for `(target, key)`.
    pub(crate) fn dep_for(&mut self, target: &(impl TrackTarget + ?Sized), key: FieldKey) -> Rc<Dep> {
        let id = target.target_id();
        let entry = self.entries.entry(id).or_insert_with(|| {
            self.created_since_sweep += 1;
            TargetEntry {
                liveness: target.liveness(),
                deps: HashMap::new(),
            }
        });
        Rc::clone(
            entry
                .deps
                .entry(key)
                .or_insert_with_key(|key| Rc::new(Dep::new(id, key.clone()))),
        )
    }

    pub(crate) fn lookup(&self, target: ObjectId, key: &FieldKey) -> Option<Rc<Dep>> {
        self.entries.get(&target)?.deps.get(key).cloned()
    }

    pub(crate) fn release(&mut self, target: ObjectId) -> Option<TargetEntry> {
        self.entries.remove(&target)
    }

    pub(crate) fn needs_sweep(&self) -> bool {
        self.sweep_threshold > 0 && self.created_since_sweep >= self.sweep_threshold
    }

    /// Remove every entry whose object has been dropped.
    pub(crate) fn sweep(&mut self) -> Vec<TargetEntry> {
        self.created_since_sweep = 0;
        let dead: Vec<ObjectId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_dead())
            .map(|(id, _)| *id)
            .collect();
        dead.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    pub(crate) fn target_count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn subscriber_count(&self, target: ObjectId, key: &FieldKey) -> usize {
        self.lookup(target, key).map_or(0, |dep| dep.len())
    }
}
