//! Identity tokens for the reactive system.
//!
//! Every participant in dependency tracking gets a stable numeric identity
//! when it is created: effects get an [`EffectId`], tracked targets (raw
//! objects and the synthetic targets of computed values) get an
//! [`ObjectId`], and deferred watcher jobs get a [`JobId`]. The dependency
//! store is keyed by these tokens rather than by pointers, which keeps the
//! object-to-dependency association explicit and evictable.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Generate a new unique ID.
            ///
            /// Uses an atomic counter so IDs stay unique across runtimes.
            pub fn new() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(0);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            /// Get the raw ID value.
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for an effect.
    ///
    /// Used as the membership key inside a dependency set, so an effect is
    /// subscribed at most once per `(object, field)` pair.
    EffectId,
    "effect"
);

id_type!(
    /// Stable identity of a tracked target.
    ///
    /// Raw objects receive one at construction; computed values allocate one
    /// for their synthetic "value" target.
    ObjectId,
    "object"
);

id_type!(
    /// Identity of a deferred job, used to coalesce repeated scheduling of the
    /// same job within one flush cycle.
    JobId,
    "job"
);
