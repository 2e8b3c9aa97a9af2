use serde::{Deserialize, Serialize};

/// Source of the Lagrangian Hessian in the KKT matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HessianApproximation {
    /// Second derivatives from the problem; falls back to BFGS when it has none.
    Exact,
    /// Damped BFGS from gradient differences.
    Bfgs,
}

/// Interior point settings. Defaults follow common primal-dual practice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpmOptions {
    /// Overall optimality error for convergence.
    pub tol: f64,
    /// Looser level that also counts as converged when held long enough.
    pub acceptable_tol: f64,
    pub acceptable_iter: usize,
    /// Primal infeasibility above which a stalled solve is called infeasible.
    pub constr_viol_tol: f64,
    pub hessian_approximation: HessianApproximation,
    pub mu_init: f64,
    pub mu_linear_decrease: f64,
    pub mu_superlinear_power: f64,
    /// The barrier problem is solved to `barrier_tol_factor * mu`.
    pub barrier_tol_factor: f64,
    pub tau_min: f64,
    /// Absolute and relative push of the starting point into the bounds.
    pub bound_push: f64,
    pub bound_frac: f64,
    pub bound_relax_factor: f64,
    /// Initial constraint multipliers larger than this are discarded.
    pub constr_mult_init_max: f64,
    /// Sufficient decrease factor of the barrier objective.
    pub armijo: f64,
    pub max_line_search: usize,
    /// Second-order corrections tried per rejected trial step; 0 disables them.
    pub max_soc: usize,
    /// Required constraint violation decrease between corrections.
    pub kappa_soc: f64,
    pub divergence_limit: f64,
    /// First and bounding diagonal shifts of the Hessian block during
    /// inertia correction.
    pub first_hessian_perturbation: f64,
    pub min_hessian_perturbation: f64,
    pub max_hessian_perturbation: f64,
    /// Diagonal shift of the dual block of the KKT matrix.
    pub dual_regularization: f64,
}

impl Default for IpmOptions {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            acceptable_tol: 1e-4,
            acceptable_iter: 15,
            constr_viol_tol: 1e-4,
            hessian_approximation: HessianApproximation::Exact,
            mu_init: 0.1,
            mu_linear_decrease: 0.2,
            mu_superlinear_power: 1.5,
            barrier_tol_factor: 10.0,
            tau_min: 0.99,
            bound_push: 1e-2,
            bound_frac: 1e-2,
            bound_relax_factor: 1e-8,
            constr_mult_init_max: 1e3,
            armijo: 1e-4,
            max_line_search: 40,
            max_soc: 4,
            kappa_soc: 0.99,
            divergence_limit: 1e20,
            first_hessian_perturbation: 1e-4,
            min_hessian_perturbation: 1e-20,
            max_hessian_perturbation: 1e20,
            dual_regularization: 1e-8,
        }
    }
}
