//! Error types for simulation operations.

use thiserror::Error;
use traj_phase::OdeError;
use traj_transcription::TranscriptionError;

/// Errors encountered during time integration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-finite state at t = {t}")]
    NonFinite { t: f64 },

    #[error("Step size {h:e} below minimum at t = {t}")]
    StepSizeUnderflow { t: f64, h: f64 },

    #[error("Step budget of {max_steps} exhausted at t = {t}")]
    StepLimit { max_steps: usize, t: f64 },

    #[error("ODE evaluation failed at t = {t}: {source}")]
    Ode {
        t: f64,
        #[source]
        source: OdeError,
    },

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Failure of the integration itself rather than of its inputs.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            SimError::NonFinite { .. }
                | SimError::StepSizeUnderflow { .. }
                | SimError::StepLimit { .. }
                | SimError::Ode { .. }
        )
    }
}
