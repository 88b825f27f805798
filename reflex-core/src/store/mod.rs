//! Dependency Store
//!
//! This module holds the bookkeeping that connects reads to later writes.
//!
//! # Overview
//!
//! Every tracked read records an edge `(target, key) -> effect`:
//!
//! - a *target* is a raw object, or the synthetic target of a computed value,
//! - a *key* is a field name, the enumeration sentinel, or the synthetic
//!   value key,
//! - the set of effects for one `(target, key)` pair is a [`Dep`].
//!
//! Edges are kept in both directions. Each dep lists its effects, and each
//! effect lists the deps it belongs to, so an effect can drop all of its
//! subscriptions in O(deps) before it re-runs.

mod dep;
mod registry;

pub use dep::{FieldKey, TriggerOp};
pub use registry::TrackTarget;

pub(crate) use dep::Dep;
pub(crate) use registry::DependencyStore;
