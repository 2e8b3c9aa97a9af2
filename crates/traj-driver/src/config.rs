use serde::{Deserialize, Serialize};
use traj_nlp::{ColoringConfig, FiniteDifference};

/// Caller-imposed limits and derivative settings for one solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub max_iterations: usize,
    /// Wall-clock budget in seconds, checked between iterations.
    pub max_wall_time: Option<f64>,
    pub coloring: ColoringConfig,
    pub fd: FiniteDifference,
    /// Scaled distance below which a row counts as active or violated.
    pub feasibility_tol: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            max_wall_time: None,
            coloring: ColoringConfig::default(),
            fd: FiniteDifference::default(),
            feasibility_tol: 1e-4,
        }
    }
}
