use thiserror::Error;
use traj_transcription::TranscriptionError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NlpError {
    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    Dimension {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Non-finite {what} at index {index}")]
    NonFinite { what: &'static str, index: usize },

    #[error("Numerical failure: {what}")]
    Numeric { what: String },

    #[error("Problem does not provide a {what}")]
    Unsupported { what: &'static str },

    #[error("Solver used before start()")]
    NotStarted,

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

pub type NlpResult<T> = Result<T, NlpError>;
