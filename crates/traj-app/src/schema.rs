//! Canonical case file format: one single-phase problem per YAML document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use traj_driver::DriverConfig;
use traj_optimizer::IpmOptions;
use traj_phase::{
    BoundaryConstraint, ControlDef, Objective, ParameterDef, PathConstraint, StateDef,
    TimeOptions,
};
use traj_sim::VerifyOptions;

use crate::models::ModelOptions;

pub const LATEST_VERSION: u32 = 1;

fn latest_version() -> u32 {
    LATEST_VERSION
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    #[serde(default = "latest_version")]
    pub version: u32,
    pub name: String,
    pub model: ModelDef,
    #[serde(default)]
    pub time: TimeOptions,
    pub states: Vec<StateDef>,
    #[serde(default)]
    pub controls: Vec<ControlDef>,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub boundary_constraints: Vec<BoundaryConstraint>,
    #[serde(default)]
    pub path_constraints: Vec<PathConstraint>,
    pub objective: Objective,
    #[serde(default)]
    pub transcription: TranscriptionDef,
    #[serde(default)]
    pub guess: InitialGuess,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub solver: IpmOptions,
    #[serde(default)]
    pub verify: VerifyOptions,
    /// Simulate the optimized controls after the solve.
    #[serde(default)]
    pub simulate: bool,
}

/// ODE model reference, resolved through the model registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    #[serde(default)]
    pub options: ModelOptions,
}

/// Mesh and Gauss-Lobatto settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscriptionDef {
    pub num_segments: usize,
    pub order: usize,
    /// Increasing segment boundaries (`num_segments + 1` entries); uniform when absent.
    pub segment_ends: Option<Vec<f64>>,
    pub compressed: bool,
}

impl Default for TranscriptionDef {
    fn default() -> Self {
        Self {
            num_segments: 10,
            order: 3,
            segment_ends: None,
            compressed: false,
        }
    }
}

/// Initial guess samples, evenly spaced over the phase.
///
/// Two samples are the initial and final value; a single sample is held
/// constant. Variables without samples keep their default guess.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitialGuess {
    pub t_initial: f64,
    pub t_duration: f64,
    pub states: BTreeMap<String, Vec<f64>>,
    pub controls: BTreeMap<String, Vec<f64>>,
    pub parameters: BTreeMap<String, f64>,
}

impl Default for InitialGuess {
    fn default() -> Self {
        Self {
            t_initial: 0.0,
            t_duration: 1.0,
            states: BTreeMap::new(),
            controls: BTreeMap::new(),
            parameters: BTreeMap::new(),
        }
    }
}

impl InitialGuess {
    pub fn new(t_initial: f64, t_duration: f64) -> Self {
        Self {
            t_initial,
            t_duration,
            ..Self::default()
        }
    }

    pub fn state(mut self, name: impl Into<String>, samples: Vec<f64>) -> Self {
        self.states.insert(name.into(), samples);
        self
    }

    pub fn control(mut self, name: impl Into<String>, samples: Vec<f64>) -> Self {
        self.controls.insert(name.into(), samples);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}
