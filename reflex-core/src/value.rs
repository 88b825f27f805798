//! Schema-less Values and Raw Objects
//!
//! The runtime observes plain records: a [`RawObject`] is a shared,
//! insertion-ordered map from field name to [`Value`]. Cloning a `RawObject`
//! clones the handle, not the record, so every clone refers to the same
//! underlying object and compares equal by identity.
//!
//! # Equality
//!
//! Change detection follows strict-equality semantics:
//!
//! - numbers compare with IEEE `==` (so `NaN` is never equal to itself),
//! - strings compare by content,
//! - objects compare by identity.
//!
//! [`has_changed`] layers the NaN rule on top: writing NaN over NaN is not a
//! change.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::{Map, Number};

use crate::error::ReactiveError;
use crate::reactive::ObjectId;

/// A dynamically typed field value.
#[derive(Clone, Default)]
pub enum Value {
    /// The field does not exist, or was never assigned.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// A nested record, held by reference.
    Object(RawObject),
}

impl Value {
    /// Strict equality: identity for objects, IEEE equality for numbers.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&RawObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Convert a JSON value. Arrays become objects keyed by index.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                let obj = RawObject::new();
                for (index, item) in items.into_iter().enumerate() {
                    obj.insert(index.to_string(), Value::from_json(item));
                }
                Value::Object(obj)
            }
            serde_json::Value::Object(map) => Value::Object(RawObject::from_json_map(map)),
        }
    }

    fn to_json_inner(&self, path: &mut HashSet<ObjectId>) -> Result<serde_json::Value, ReactiveError> {
        Ok(match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Object(obj) => obj.to_json_inner(path)?,
        })
    }
}

/// Returns true when writing `new` over `old` is an observable change.
///
/// A write is a change when the values are not strictly equal, except that
/// NaN over NaN is not a change.
pub fn has_changed(old: &Value, new: &Value) -> bool {
    !old.strict_eq(new) && !(old.is_nan() && new.is_nan())
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "[{}]", obj.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<RawObject> for Value {
    fn from(obj: RawObject) -> Self {
        Value::Object(obj)
    }
}

impl From<&RawObject> for Value {
    fn from(obj: &RawObject) -> Self {
        Value::Object(obj.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

struct ObjectCell {
    id: ObjectId,
    fields: RefCell<IndexMap<String, Value>>,
}

/// A shared mutable record, compared by identity.
///
/// Reads and writes through a `RawObject` are untracked. Go through an
/// [`Observable`](crate::reactive::Observable) to participate in dependency
/// tracking.
#[derive(Clone)]
pub struct RawObject {
    cell: Rc<ObjectCell>,
}

impl RawObject {
    /// Create an empty object with a fresh identity.
    pub fn new() -> Self {
        Self {
            cell: Rc::new(ObjectCell {
                id: ObjectId::new(),
                fields: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Build an object from `(key, value)` pairs, preserving their order.
    pub fn from_fields<K, V, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let obj = Self::new();
        for (key, value) in fields {
            obj.insert(key, value);
        }
        obj
    }

    /// Build an object tree from a JSON value. The root must be an object.
    pub fn from_json(json: serde_json::Value) -> Result<Self, ReactiveError> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_json_map(map)),
            _ => Err(ReactiveError::NotAnObject),
        }
    }

    /// Parse JSON text into an object tree.
    pub fn from_json_str(text: &str) -> Result<Self, ReactiveError> {
        Self::from_json(serde_json::from_str(text)?)
    }

    fn from_json_map(map: Map<String, serde_json::Value>) -> Self {
        let obj = Self::new();
        for (key, value) in map {
            obj.insert(key, Value::from_json(value));
        }
        obj
    }

    /// Export the object tree as JSON.
    ///
    /// Fails with [`ReactiveError::Cycle`] if an object is reachable from
    /// itself. Shared (non-cyclic) subtrees are exported once per reference.
    pub fn to_json(&self) -> Result<serde_json::Value, ReactiveError> {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, path: &mut HashSet<ObjectId>) -> Result<serde_json::Value, ReactiveError> {
        if !path.insert(self.id()) {
            return Err(ReactiveError::Cycle(self.id()));
        }
        let mut map = Map::new();
        for (key, value) in self.entries() {
            map.insert(key, value.to_json_inner(path)?);
        }
        path.remove(&self.id());
        Ok(serde_json::Value::Object(map))
    }

    pub fn id(&self) -> ObjectId {
        self.cell.id
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &RawObject) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Read a field; missing fields read as [`Value::Undefined`].
    pub fn get(&self, key: &str) -> Value {
        self.cell.fields.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Write a field, returning the previous value if the key existed.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.cell.fields.borrow_mut().insert(key.into(), value.into())
    }

    /// Remove a field, returning its value if it existed.
    ///
    /// Remaining fields keep their relative order.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.cell.fields.borrow_mut().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.cell.fields.borrow().contains_key(key)
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.cell.fields.borrow().keys().cloned().collect()
    }

    /// Snapshot of all fields in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.cell
            .fields
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cell.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a weak liveness handle for this object.
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            cell: Rc::downgrade(&self.cell),
        }
    }
}

impl Default for RawObject {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for RawObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for RawObject {}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Fields are printed one level deep; nested objects print as ids.
        let mut map = f.debug_map();
        for (key, value) in self.entries() {
            map.entry(&key, &value);
        }
        map.finish()
    }
}

/// A non-owning reference to a [`RawObject`].
#[derive(Clone)]
pub struct WeakObject {
    cell: Weak<ObjectCell>,
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<RawObject> {
        self.cell.upgrade().map(|cell| RawObject { cell })
    }

    /// True while some `RawObject` handle still owns the record.
    pub fn is_alive(&self) -> bool {
        self.cell.strong_count() > 0
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_to_nan_is_not_a_change() {
        let nan = Value::Number(f64::NAN);
        assert!(!nan.strict_eq(&nan));
        assert!(!has_changed(&nan, &Value::Number(f64::NAN)));
        assert!(has_changed(&nan, &Value::Number(1.0)));
        assert!(has_changed(&Value::Number(1.0), &nan));
    }

    #[test]
    fn signed_zero_is_not_a_change() {
        assert!(!has_changed(&Value::Number(0.0), &Value::Number(-0.0)));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = RawObject::from_fields([("x", 1)]);
        let b = RawObject::from_fields([("x", 1)]);

        assert!(has_changed(&Value::from(&a), &Value::from(&b)));
        assert!(!has_changed(&Value::from(&a), &Value::from(a.clone())));
    }

    #[test]
    fn type_changes_are_changes() {
        assert!(has_changed(&Value::Undefined, &Value::Null));
        assert!(has_changed(&Value::from(1), &Value::from("1")));
        assert!(!has_changed(&Value::from("a"), &Value::from("a")));
    }

    #[test]
    fn insert_reports_previous_value() {
        let obj = RawObject::new();
        assert!(obj.insert("a", 1).is_none());
        let previous = obj.insert("a", 2).expect("key existed");
        assert_eq!(previous.as_f64(), Some(1.0));
        assert!(obj.get("missing").is_undefined());
    }

    #[test]
    fn remove_preserves_order() {
        let obj = RawObject::from_fields([("a", 1), ("b", 2), ("c", 3)]);
        obj.remove("b");
        assert_eq!(obj.keys(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn json_round_trip_keeps_structure() {
        let obj = RawObject::from_json(json!({
            "name": "reflex",
            "nested": { "depth": 2 },
            "tags": ["a", "b"],
        }))
        .unwrap();

        let nested = obj.get("nested");
        assert_eq!(nested.as_object().unwrap().get("depth").as_f64(), Some(2.0));
        assert_eq!(obj.get("tags").as_object().unwrap().len(), 2);

        let exported = obj.to_json().unwrap();
        assert_eq!(exported["name"], json!("reflex"));
        assert_eq!(exported["nested"]["depth"], json!(2.0));
        assert_eq!(exported["tags"]["1"], json!("b"));
    }

    #[test]
    fn json_rejects_non_object_root() {
        assert!(matches!(
            RawObject::from_json(json!([1, 2])),
            Err(ReactiveError::NotAnObject)
        ));
        assert!(matches!(
            RawObject::from_json_str("{not json"),
            Err(ReactiveError::Json(_))
        ));
    }

    #[test]
    fn json_export_detects_cycles() {
        let a = RawObject::new();
        let b = RawObject::new();
        a.insert("b", &b);
        b.insert("a", &a);

        assert!(matches!(a.to_json(), Err(ReactiveError::Cycle(_))));
    }

    #[test]
    fn json_export_allows_shared_subtrees() {
        let shared = RawObject::from_fields([("v", 1)]);
        let root = RawObject::from_fields([("left", &shared), ("right", &shared)]);
        let exported = root.to_json().unwrap();
        assert_eq!(exported["left"], exported["right"]);
    }

    #[test]
    fn nan_exports_as_null() {
        let obj = RawObject::from_fields([("x", f64::NAN)]);
        assert_eq!(obj.to_json().unwrap()["x"], serde_json::Value::Null);
    }

    #[test]
    fn weak_object_tracks_liveness() {
        let obj = RawObject::new();
        let weak = obj.downgrade();
        assert!(weak.is_alive());
        assert!(weak.upgrade().unwrap().ptr_eq(&obj));

        drop(obj);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}
