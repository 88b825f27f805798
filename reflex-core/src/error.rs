//! Error types for the reactive runtime.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::reactive::{EffectId, ObjectId};

/// Errors surfaced by the runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// One or more effects failed while a mutation was being dispatched.
    #[error("{} effect(s) failed during dispatch: {}", .0.len(), FailureList(.0))]
    Dispatch(Vec<EffectFailure>),

    /// An object graph was reachable from itself during JSON export.
    #[error("cycle detected at {0} while exporting to JSON")]
    Cycle(ObjectId),

    /// A JSON document whose root is not an object was used as a raw object.
    #[error("JSON root is not an object")]
    NotAnObject,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ReactiveError {
    /// The individual effect failures carried by this error, if any.
    pub fn failures(&self) -> &[EffectFailure] {
        match self {
            ReactiveError::Dispatch(failures) => failures,
            _ => &[],
        }
    }

    /// Flatten into a list of effect failures.
    ///
    /// Non-dispatch errors raised from inside a scheduler are attributed to
    /// the effect whose scheduler produced them.
    pub(crate) fn into_failures(self, effect: EffectId) -> Vec<EffectFailure> {
        match self {
            ReactiveError::Dispatch(failures) => failures,
            other => vec![EffectFailure {
                effect,
                message: other.to_string(),
            }],
        }
    }
}

/// A single failed effect run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectFailure {
    pub effect: EffectId,
    pub message: String,
}

impl EffectFailure {
    /// Build a failure from a caught panic payload.
    pub(crate) fn from_panic(effect: EffectId, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "effect panicked".to_string()
        };
        Self { effect, message }
    }
}

impl fmt::Display for EffectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.effect, self.message)
    }
}

struct FailureList<'a>(&'a [EffectFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
