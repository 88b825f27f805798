//! Runtime configuration.
//!
//! Configuration is plain data so an embedding application can load it from
//! its own settings file with any serde format.

use serde::{Deserialize, Serialize};

/// What the dispatcher does when an effect fails during a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPolicy {
    /// Run every effect in the working set and report all failures together.
    #[default]
    Isolate,
    /// Stop at the first failure; the remaining effects do not run.
    Abort,
}

/// Settings for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Failure handling during trigger dispatch.
    pub dispatch: DispatchPolicy,

    /// Number of newly tracked targets after which the dependency store
    /// sweeps entries whose objects have been dropped. Zero disables the
    /// automatic sweep.
    pub sweep_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchPolicy::Isolate,
            sweep_threshold: 256,
        }
    }
}
