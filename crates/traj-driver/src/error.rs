//! Error types for the solve driver.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use traj_nlp::NlpError;
use traj_transcription::TranscriptionError;

use crate::diagnostics::ConstraintDiagnostic;
use crate::driver::DriverState;
use crate::solution::Solution;

/// Why a solve ended without convergence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverFailure {
    Divergence,
    Infeasible,
    /// Line search failed at a feasible point that is not optimal.
    Stalled,
    IterationLimit,
    WallClockLimit,
}

impl fmt::Display for SolverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SolverFailure::Divergence => "solver diverged",
            SolverFailure::Infeasible => "problem locally infeasible",
            SolverFailure::Stalled => "solver stalled",
            SolverFailure::IterationLimit => "iteration limit reached",
            SolverFailure::WallClockLimit => "wall-clock limit reached",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Cannot {action} while the driver is {from:?}")]
    InvalidTransition {
        from: DriverState,
        action: &'static str,
    },

    #[error("Solve failed: {failure} ({} active or violated constraints)", .diagnostics.len())]
    Solver {
        failure: SolverFailure,
        iterate: Box<Solution>,
        diagnostics: Vec<ConstraintDiagnostic>,
    },

    #[error("NLP error: {0}")]
    Nlp(#[from] NlpError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),
}

pub type DriverResult<T> = Result<T, DriverError>;
