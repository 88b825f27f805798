//! Reactive Primitives
//!
//! This module implements the core reactive system: observable objects,
//! effects, computed values, and watchers. These primitives form the
//! foundation of Reflex's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] wraps a plain object. When one of its fields is read
//! while an effect is running, the runtime records that the effect depends
//! on that field. When the field is written, every effect that read it is
//! notified.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that re-runs whenever a field it read
//! changes. Each run starts from an empty dependency list, so dependencies
//! always reflect the latest run.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed.
//!
//! ## Watchers
//!
//! A watcher observes a getter or a whole object graph and calls back with
//! the new and previous value, synchronously or at the next post flush.
//!
//! # Implementation Notes
//!
//! The [`Runtime`] owns the active-effect stack and the dependency store.
//! There is no global state: handles carry the runtime that created them, so
//! independent runtimes never observe each other.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod computed;
mod context;
mod effect;
mod observable;
mod runtime;
mod subscriber;
mod watch;

pub use computed::Computed;
pub use effect::{Effect, EffectOptions, EffectRef, EffectScheduler, WeakEffect};
pub use observable::Observable;
pub use runtime::Runtime;
pub use subscriber::{EffectId, JobId, ObjectId};
pub use watch::{traverse, Flush, OnInvalidate, WatchHandle, WatchOptions, WatchSource};

pub(crate) use runtime::Reactive;
