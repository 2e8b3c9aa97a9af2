//! Error types for the traj-app service layer.

use std::path::PathBuf;

use traj_driver::DriverError;
use traj_nlp::NlpError;
use traj_phase::PhaseError;
use traj_sim::SimError;
use traj_transcription::TranscriptionError;

/// Application error wrapping every backend crate's error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to read case file: {path}")]
    CaseFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write case file: {path}")]
    CaseFileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse case YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Case validation failed: {0}")]
    Validation(String),

    #[error("Unsupported case version {version} (latest is {latest})")]
    UnsupportedVersion { version: u32, latest: u32 },

    #[error("Unknown ODE model '{name}' (available: {available})")]
    UnknownModel { name: String, available: String },

    #[error("Invalid option '{option}' for model '{model}': {reason}")]
    ModelOption {
        model: String,
        option: String,
        reason: String,
    },

    #[error("Phase not found: {0}")]
    PhaseNotFound(String),

    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    #[error("Problem used before setup()")]
    NotSetUp,

    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("NLP error: {0}")]
    Nlp(#[from] NlpError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for traj-app operations.
pub type AppResult<T> = Result<T, AppError>;
