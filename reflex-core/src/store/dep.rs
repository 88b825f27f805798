//! Dependency Sets
//!
//! A [`Dep`] is the set of effects that read one `(target, key)` pair. It is
//! the unit of subscription: effects are added by `track` and removed by
//! effect cleanup, and `trigger` snapshots a dep's members before running
//! any of them.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::reactive::{EffectId, ObjectId, Reactive};

/// The key half of a dependency: which aspect of a target was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    /// A concrete field name, read by `get` or checked by `has`.
    Field(Rc<str>),

    /// The target's key set, read by enumeration. Invalidated only when a
    /// field is added or deleted.
    Iterate,

    /// The single value of a synthetic target, such as a computed value.
    Value,
}

impl FieldKey {
    pub fn field(name: &str) -> Self {
        FieldKey::Field(name.into())
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        FieldKey::field(name)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Field(name) => f.write_str(name),
            FieldKey::Iterate => f.write_str("<iterate>"),
            FieldKey::Value => f.write_str("<value>"),
        }
    }
}

/// The kind of mutation being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// A new key was added.
    Add,
    /// An existing key changed value.
    Set,
    /// An existing key was removed.
    Delete,
}

impl TriggerOp {
    /// Whether this mutation changes the target's key set, and therefore
    /// must also notify enumeration readers.
    pub fn changes_keys(self) -> bool {
        matches!(self, TriggerOp::Add | TriggerOp::Delete)
    }
}

/// The set of effects subscribed to one `(target, key)` pair.
///
/// Members are kept in first-subscription order and held weakly: an effect
/// lives only as long as its handles.
pub(crate) struct Dep {
    target: ObjectId,
    key: FieldKey,
    subscribers: RefCell<IndexMap<EffectId, Weak<dyn Reactive>>>,
}

impl Dep {
    pub(crate) fn new(target: ObjectId, key: FieldKey) -> Self {
        Self {
            target,
            key,
            subscribers: RefCell::new(IndexMap::new()),
        }
    }

    pub(crate) fn target(&self) -> ObjectId {
        self.target
    }

    pub(crate) fn key(&self) -> &FieldKey {
        &self.key
    }

    /// Add an effect. Returns false if it was already a member.
    pub(crate) fn subscribe(&self, effect: Rc<dyn Reactive>) -> bool {
        let id = effect.effect_id();
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.contains_key(&id) {
            return false;
        }
        subscribers.insert(id, Rc::downgrade(&effect));
        true
    }

    /// Remove an effect. Returns false if it was not a member.
    pub(crate) fn unsubscribe(&self, id: EffectId) -> bool {
        self.subscribers.borrow_mut().shift_remove(&id).is_some()
    }

    /// Number of members whose effect is still alive.
    pub(crate) fn len(&self) -> usize {
        self.subscribers
            .borrow()
            .values()
            .filter(|effect| effect.strong_count() > 0)
            .count()
    }

    /// Copy the live members into a working set, keeping the first
    /// position of any effect already present.
    pub(crate) fn snapshot_into(&self, work: &mut IndexMap<EffectId, Rc<dyn Reactive>>) {
        for (id, effect) in self.subscribers.borrow().iter() {
            if let Some(effect) = effect.upgrade() {
                work.entry(*id).or_insert(effect);
            }
        }
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("target", &self.target)
            .field("key", &self.key)
            .field("subscribers", &self.subscribers.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
