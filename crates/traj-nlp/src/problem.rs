//! Contracts between an NLP and the solver that drives it.
//!
//! Everything here is in scaled NLP units. Bounds use `+-INFINITY` for
//! absent sides; an equality row has `lower == upper`.

use serde::{Deserialize, Serialize};

use crate::error::{NlpError, NlpResult};
use crate::sparsity::SparsityPattern;

/// A smooth nonlinear program `min f(x)` s.t. `g_l <= g(x) <= g_u`,
/// `x_l <= x <= x_u`.
pub trait NlpProblem: Sync {
    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;

    fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>);

    fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>);

    fn initial_point(&self) -> Vec<f64>;

    fn objective(&self, x: &[f64]) -> NlpResult<f64>;

    fn objective_gradient(&self, x: &[f64]) -> NlpResult<Vec<f64>>;

    fn constraints(&self, x: &[f64]) -> NlpResult<Vec<f64>>;

    fn jacobian_sparsity(&self) -> &SparsityPattern;

    /// Jacobian values in the order of [`NlpProblem::jacobian_sparsity`].
    fn jacobian_values(&self, x: &[f64]) -> NlpResult<Vec<f64>>;

    /// Lower-triangle structure of the Lagrangian Hessian, when the problem
    /// provides second derivatives.
    fn hessian_sparsity(&self) -> Option<&SparsityPattern> {
        None
    }

    /// `obj_factor * hess f + sum_i lambda_i * hess g_i` in the order of
    /// [`NlpProblem::hessian_sparsity`].
    fn hessian_values(
        &self,
        _x: &[f64],
        _obj_factor: f64,
        _lambda: &[f64],
    ) -> NlpResult<Vec<f64>> {
        Err(NlpError::Unsupported {
            what: "Lagrangian Hessian",
        })
    }

    /// Objective and constraints at the same point.
    fn evaluate(&self, x: &[f64]) -> NlpResult<(f64, Vec<f64>)> {
        Ok((self.objective(x)?, self.constraints(x)?))
    }
}

/// Verdict of one solver iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Continue,
    Converged,
    Diverged,
    Infeasible,
    Stalled,
}

/// Progress of one iteration, the way an intermediate callback reports it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: usize,
    pub objective: f64,
    /// Max constraint violation (scaled).
    pub inf_pr: f64,
    /// Max dual infeasibility (scaled).
    pub inf_du: f64,
    pub mu: f64,
    pub alpha_pr: f64,
    pub ls_trials: usize,
    pub status: IterationStatus,
}

/// Current primal-dual point of a solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverIterate {
    pub x: Vec<f64>,
    /// Constraint multipliers. Positive means the upper bound pushes.
    pub lambda: Vec<f64>,
    /// Multipliers of the variable bounds, `z_upper - z_lower`.
    pub z: Vec<f64>,
    pub objective: f64,
    pub constraints: Vec<f64>,
    pub inf_pr: f64,
    pub inf_du: f64,
}

/// An iterative NLP solver that the caller steps one iteration at a time.
pub trait NlpSolver {
    fn start(&mut self, problem: &dyn NlpProblem, x0: &[f64]) -> NlpResult<()>;

    fn iterate(&mut self, problem: &dyn NlpProblem) -> NlpResult<IterationReport>;

    fn current(&self) -> Option<&SolverIterate>;
}
