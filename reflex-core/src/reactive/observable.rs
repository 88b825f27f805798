//! Observable Objects
//!
//! An [`Observable`] is the façade every tracked read and triggering write
//! goes through. It wraps exactly one [`RawObject`]; field access through the
//! handle behaves like field access on the raw object, plus:
//!
//! | Operation   | Side effect                                              |
//! |-------------|----------------------------------------------------------|
//! | `get(k)`    | `track(obj, k)`                                          |
//! | `has(k)`    | `track(obj, k)`                                          |
//! | `keys()`    | `track(obj, ITERATE)`                                    |
//! | `set(k, v)` | `trigger(obj, k, Add)` for a new key, `trigger(obj, k, Set)` if the value changed |
//! | `delete(k)` | `trigger(obj, k, Delete)` if the key existed             |
//!
//! Nested objects are wrapped on read by [`Observable::child`], so deep field
//! access is tracked level by level.
//!
//! [`Observable::raw`] is the untracked escape hatch. Writing an
//! `Observable` into a field stores its raw object, never the wrapper.

use std::fmt;

use super::runtime::{Runtime, WeakRuntime};
use super::ObjectId;
use crate::error::ReactiveError;
use crate::store::{FieldKey, TrackTarget, TriggerOp};
use crate::value::{has_changed, RawObject, Value, WeakObject};

/// A tracked handle to a raw object.
///
/// Cloning an `Observable` creates a new handle to the **same** object;
/// handles compare equal when they wrap the same raw object.
#[derive(Clone)]
pub struct Observable {
    raw: RawObject,
    runtime: WeakRuntime,
}

impl Observable {
    pub(crate) fn new(raw: RawObject, runtime: WeakRuntime) -> Self {
        Self { raw, runtime }
    }

    /// The wrapped object. Access through it is untracked.
    pub fn raw(&self) -> &RawObject {
        &self.raw
    }

    pub fn id(&self) -> ObjectId {
        self.raw.id()
    }

    /// The runtime this handle reports to, if it is still alive.
    pub fn runtime(&self) -> Option<Runtime> {
        self.runtime.upgrade()
    }

    fn track(&self, key: FieldKey) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track(&self.raw, key);
        }
    }

    fn trigger(&self, key: &str, op: TriggerOp) -> Result<(), ReactiveError> {
        match self.runtime.upgrade() {
            Some(runtime) => runtime.trigger(&self.raw, FieldKey::field(key), op),
            None => Ok(()),
        }
    }

    /// Read a field. Missing fields read as [`Value::Undefined`].
    pub fn get(&self, key: &str) -> Value {
        self.track(FieldKey::field(key));
        self.raw.get(key)
    }

    /// Read a field that holds an object, wrapped for tracked access.
    pub fn child(&self, key: &str) -> Option<Observable> {
        match self.get(key) {
            Value::Object(raw) => Some(Observable::new(raw, self.runtime.clone())),
            _ => None,
        }
    }

    /// Write a field and notify dependents.
    ///
    /// Adding a key always triggers. Overwriting triggers only when the value
    /// changed, so writing NaN over NaN or the same object again is silent.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let value = value.into();
        match self.raw.insert(key, value.clone()) {
            None => self.trigger(key, TriggerOp::Add),
            Some(old) if has_changed(&old, &value) => self.trigger(key, TriggerOp::Set),
            Some(_) => Ok(()),
        }
    }

    /// Check whether a field exists, tracking the field.
    pub fn has(&self, key: &str) -> bool {
        self.track(FieldKey::field(key));
        self.raw.contains_key(key)
    }

    /// List field names, tracking the key set.
    pub fn keys(&self) -> Vec<String> {
        self.track(FieldKey::Iterate);
        self.raw.keys()
    }

    /// Number of fields, tracking the key set.
    pub fn len(&self) -> usize {
        self.track(FieldKey::Iterate);
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a field. Returns false, without triggering, if it did not
    /// exist.
    pub fn delete(&self, key: &str) -> Result<bool, ReactiveError> {
        if self.raw.remove(key).is_none() {
            return Ok(false);
        }
        self.trigger(key, TriggerOp::Delete)?;
        Ok(true)
    }
}

impl TrackTarget for Observable {
    fn target_id(&self) -> ObjectId {
        self.raw.id()
    }

    fn liveness(&self) -> Option<WeakObject> {
        Some(self.raw.downgrade())
    }
}

impl From<&Observable> for Value {
    fn from(observable: &Observable) -> Self {
        Value::Object(observable.raw.clone())
    }
}

impl From<Observable> for Value {
    fn from(observable: Observable) -> Self {
        Value::Object(observable.raw)
    }
}

impl PartialEq for Observable {
    fn eq(&self, other: &Self) -> bool {
        self.raw.ptr_eq(&other.raw)
    }
}

impl Eq for Observable {}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.raw.id())
            .field("fields", &self.raw)
            .finish()
    }
}
