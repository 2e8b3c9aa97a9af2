//! Error types for schema declaration and validation.

use thiserror::Error;
use traj_core::CoreError;

/// Schema errors. The caller must fix the configuration; these are never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhaseError {
    #[error("Duplicate name '{name}' (already declared as {existing})")]
    DuplicateName { name: String, existing: &'static str },

    #[error("Invalid bounds for '{name}': lower={lower} > upper={upper}")]
    InvalidBounds { name: String, lower: f64, upper: f64 },

    #[error("Duration lower bound {lower} admits a zero-length phase")]
    NonPositiveDuration { lower: f64 },

    #[error("Invalid scaling for '{name}': {reason}")]
    InvalidScale { name: String, reason: String },

    #[error("Unresolved target '{key}' in {context}")]
    UnresolvedTarget { key: String, context: String },

    #[error("ODE input '{input}' is targeted by both {first} and {second}")]
    ConflictingTarget {
        input: String,
        first: String,
        second: String,
    },

    #[error("ODE input '{input}' is not connected to any state, control or parameter")]
    UnconnectedInput { input: String },

    #[error("Invalid constraint on '{target}': {reason}")]
    InvalidConstraint { target: String, reason: String },

    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("Phase has no objective")]
    MissingObjective,

    #[error("Phase has no states")]
    NoStates,

    #[error("Incompatible units for '{name}': {source}")]
    IncompatibleUnits {
        name: String,
        #[source]
        source: CoreError,
    },
}

pub type PhaseResult<T> = Result<T, PhaseError>;
