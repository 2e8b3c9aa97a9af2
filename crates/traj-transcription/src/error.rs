//! Error types for mesh construction, transcription and guess handling.

use thiserror::Error;
use traj_phase::{OdeError, PhaseError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscriptionError {
    #[error("Invalid mesh: {reason}")]
    InvalidMesh { reason: String },

    #[error("Guess for '{name}' has {actual} values, expected {expected}")]
    GuessShape {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("Non-finite value in '{name}' at index {index}")]
    NonFinite { name: String, index: usize },

    #[error("Phase duration {duration} is not positive")]
    NonPositiveDuration { duration: f64 },

    #[error("Design vector has {actual} entries, expected {expected}")]
    DesignLength { expected: usize, actual: usize },

    #[error("ODE evaluation failed at node {node} (segment {segment}): {source}")]
    Ode {
        node: usize,
        segment: usize,
        #[source]
        source: OdeError,
    },

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

pub type TranscriptionResult<T> = Result<T, TranscriptionError>;
