//! Stable keys for quantities referenced by constraints, objectives and rate sources.

use serde::{Deserialize, Serialize};

/// A resolved reference to a phase quantity.
///
/// Indices point into the phase's declaration lists (states, controls,
/// parameters) or into the ODE signature's outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    Time,
    State(usize),
    Control(usize),
    Parameter(usize),
    Output(usize),
}

/// The reserved key for phase time.
pub const TIME_KEY: &str = "time";
