//! Read-only snapshots of an iterate.

use serde::Serialize;
use traj_nlp::{NlpResult, SolverIterate, TranscribedNlp};
use traj_transcription::{Timeseries, TrajectoryBuffer};

/// Physical-unit view of one solver iterate.
#[derive(Clone, Debug, Serialize)]
pub struct Solution {
    pub buffer: TrajectoryBuffer,
    /// Objective target value in physical units.
    pub objective: f64,
    /// Physical value of every constraint row.
    pub constraints: Vec<f64>,
    /// Row multipliers in scaled NLP units.
    pub multipliers: Vec<f64>,
    pub inf_pr: f64,
    pub inf_du: f64,
    pub timeseries: Timeseries,
}

impl Solution {
    pub fn from_iterate(nlp: &TranscribedNlp<'_>, iterate: &SolverIterate) -> NlpResult<Self> {
        let transcription = nlp.transcription();
        let buffer = nlp.buffer_at(&iterate.x)?;
        let values = transcription.evaluate(&buffer)?;
        let timeseries = transcription.timeseries(&buffer)?;
        Ok(Self {
            objective: transcription.objective_physical(&values),
            constraints: transcription.constraint_values_physical(&buffer, &values),
            multipliers: iterate.lambda.clone(),
            inf_pr: iterate.inf_pr,
            inf_du: iterate.inf_du,
            timeseries,
            buffer,
        })
    }

    pub fn t_final(&self) -> f64 {
        self.buffer.t_initial + self.buffer.t_duration
    }

    /// Final value of a state.
    pub fn final_state(&self, name: &str) -> Option<f64> {
        self.buffer.state(name).and_then(|v| v.last().copied())
    }

    pub fn initial_state(&self, name: &str) -> Option<f64> {
        self.buffer.state(name).and_then(|v| v.first().copied())
    }
}
