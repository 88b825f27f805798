//! Reflex Core
//!
//! This crate provides a fine-grained reactive runtime over plain objects.
//! It implements:
//!
//! - Observable objects whose field reads are tracked and writes trigger
//! - Effects that re-run when a field they read changes
//! - Lazily evaluated, cached computed values
//! - Watchers with synchronous or deferred (post) flushing
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the runtime, effects, observables, computeds and watchers
//! - `store`: the dependency store mapping `(object, key)` to subscribers
//! - `schedule`: job schedulers used for deferred flushing
//! - `value`: the dynamic value model and shared raw objects
//! - `config`: runtime settings
//! - `error`: error types
//!
//! # Example
//!
//! ```rust
//! use reflex_core::reactive::Runtime;
//! use reflex_core::value::RawObject;
//!
//! let rt = Runtime::new();
//! let state = rt.wrap(RawObject::from_fields([("count", 0)]));
//!
//! // Create a derived value
//! let reader = state.clone();
//! let doubled = rt.computed(move || reader.get("count").as_f64().unwrap_or(0.0) * 2.0);
//!
//! // Create an effect
//! let reader = state.clone();
//! let _effect = rt.effect(move || {
//!     println!("Count: {:?}, Doubled: {}", reader.get("count"), doubled.get());
//! });
//!
//! // Update the field
//! state.set("count", 5).unwrap();
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod schedule;
pub mod store;
pub mod value;

pub use config::{DispatchPolicy, RuntimeConfig};
pub use error::{EffectFailure, ReactiveError};
pub use reactive::{Computed, Effect, Observable, Runtime, WatchHandle, WatchOptions};
pub use value::{RawObject, Value};
