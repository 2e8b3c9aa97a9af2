//! Primal-dual interior point method with a filter line search.
//!
//! Inequality rows `g_l <= g(x) <= g_u` become `g(x) - s = 0` with the slack
//! `s` carrying the bounds, so every bound acts on the combined primal vector
//! `z = (x, s)`. Each iteration solves the dense KKT system
//!
//! ```text
//! [ W + Sigma + dw I   A' ] [ dz ]   [ -(grad phi + A' lambda) ]
//! [ A              -dc I  ] [ dl ] = [ -c                      ]
//! ```
//!
//! where `phi` is the log-barrier objective and `dw` is the smallest shift
//! giving the matrix `nz` positive and `m` negative eigenvalues. `W` is the
//! problem's Lagrangian Hessian when it has one, a damped BFGS matrix
//! otherwise.
//!
//! Trial points are accepted by a filter over the constraint violation
//! `theta = |c|_1` and `phi`. A rejected trial that did not reduce `theta`
//! gets second-order corrections; a failed search falls back to a
//! feasibility step before giving up.

use nalgebra::{DMatrix, DVector, Dyn, LU};
use tracing::{debug, trace};
use traj_nlp::{
    IterationReport, IterationStatus, NlpError, NlpProblem, NlpResult, NlpSolver, SolverIterate,
};

use crate::bfgs::DampedBfgs;
use crate::options::{HessianApproximation, IpmOptions};

const KAPPA_SIGMA: f64 = 1e10;
const SCALING_MAX: f64 = 100.0;
/// Bounds at or beyond this magnitude are treated as absent.
const BOUND_INFINITY: f64 = 1e19;

const GAMMA_THETA: f64 = 1e-5;
const GAMMA_PHI: f64 = 1e-8;
const GAMMA_ALPHA: f64 = 0.05;
const S_THETA: f64 = 1.1;
const S_PHI: f64 = 2.3;
const SWITCH_DELTA: f64 = 1.0;
/// Relative step below which the direction counts as converged for this `mu`.
const TINY_STEP: f64 = 1e-14;
/// Proximity weight of the feasibility step.
const FEASIBILITY_DAMPING: f64 = 1.0;

/// Interior point solver. Driven one iteration at a time through [`NlpSolver`].
#[derive(Debug, Default)]
pub struct InteriorPoint {
    options: IpmOptions,
    state: Option<State>,
}

/// Pairs `(theta, phi)` that trial points must improve on.
#[derive(Clone, Debug, Default)]
struct Filter {
    entries: Vec<(f64, f64)>,
}

impl Filter {
    fn accepts(&self, theta: f64, phi: f64) -> bool {
        self.entries.iter().all(|&(t, p)| theta < t || phi < p)
    }

    /// Forbid the neighbourhood of the point `(theta, phi)`.
    fn augment(&mut self, theta: f64, phi: f64) {
        let (t, p) = ((1.0 - GAMMA_THETA) * theta, phi - GAMMA_PHI * theta);
        self.entries.retain(|&(et, ep)| et < t || ep < p);
        self.entries.push((t, p));
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug)]
struct State {
    n: usize,
    m: usize,
    /// Slack index of each row, `None` for equality rows.
    slack_of_row: Vec<Option<usize>>,
    /// Target value of equality rows.
    row_target: Vec<f64>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    z: DVector<f64>,
    lambda: DVector<f64>,
    zl: DVector<f64>,
    zu: DVector<f64>,
    f: f64,
    g: DVector<f64>,
    grad: DVector<f64>,
    jac: DMatrix<f64>,
    /// Exact Lagrangian Hessian over `x`; unused when `bfgs` is set.
    w: DMatrix<f64>,
    bfgs: Option<DampedBfgs>,
    mu: f64,
    tau: f64,
    filter: Filter,
    theta_max: f64,
    theta_min: f64,
    /// Last nonzero Hessian shift of the inertia correction.
    delta_w_last: f64,
    force_mu_decrease: bool,
    iteration: usize,
    acceptable_count: usize,
    current: SolverIterate,
}

/// Values at the current point that trial points are judged against.
#[derive(Clone, Copy, Debug)]
struct Reference {
    theta: f64,
    phi: f64,
    /// Directional derivative of `phi` along the step.
    slope: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Acceptance {
    /// Armijo decrease of `phi` from a nearly feasible point.
    Objective,
    /// Sufficient decrease of `theta` or `phi`; the filter grows.
    Filter,
}

struct Trial {
    f: f64,
    g: DVector<f64>,
    c: DVector<f64>,
    theta: f64,
    phi: f64,
}

/// Accepted trial point.
struct Step {
    alpha: f64,
    z: DVector<f64>,
    lambda: DVector<f64>,
    f: f64,
    g: DVector<f64>,
    /// Primal direction that drives the bound multiplier update.
    dz: DVector<f64>,
    augment_filter: bool,
}

/// LU factors of a KKT matrix.
struct Factorization {
    lu: LU<f64, Dyn, Dyn>,
    nz: usize,
    m: usize,
}

impl Factorization {
    fn new(primal: &DMatrix<f64>, a: &DMatrix<f64>, delta_c: f64) -> Self {
        Self {
            lu: kkt_matrix(primal, a, delta_c).lu(),
            nz: primal.nrows(),
            m: a.nrows(),
        }
    }

    fn solve(
        &self,
        top: &DVector<f64>,
        bottom: &DVector<f64>,
    ) -> Option<(DVector<f64>, DVector<f64>)> {
        let mut rhs = DVector::zeros(self.nz + self.m);
        rhs.rows_mut(0, self.nz).copy_from(top);
        rhs.rows_mut(self.nz, self.m).copy_from(bottom);
        let sol = self.lu.solve(&rhs)?;
        if !sol.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some((
            sol.rows(0, self.nz).into_owned(),
            sol.rows(self.nz, self.m).into_owned(),
        ))
    }
}

fn kkt_matrix(primal: &DMatrix<f64>, a: &DMatrix<f64>, delta_c: f64) -> DMatrix<f64> {
    let (nz, m) = (primal.nrows(), a.nrows());
    let mut k = DMatrix::zeros(nz + m, nz + m);
    k.view_mut((0, 0), (nz, nz)).copy_from(primal);
    k.view_mut((nz, 0), (m, nz)).copy_from(a);
    k.view_mut((0, nz), (nz, m)).copy_from(&a.transpose());
    for i in 0..m {
        k[(nz + i, nz + i)] = -delta_c;
    }
    k
}

/// Factor the KKT matrix with the smallest diagonal shift of `primal` that
/// gives it `nz` positive and `m` negative eigenvalues. With the dual block
/// `-dc I` that holds exactly when `primal + dw I + A'A / dc` is positive
/// definite.
fn factor_with_inertia(
    primal: &DMatrix<f64>,
    a: &DMatrix<f64>,
    opts: &IpmOptions,
    delta_w_last: f64,
) -> Option<(Factorization, f64)> {
    let delta_c = opts.dual_regularization;
    let nz = primal.nrows();
    let condensed = primal + a.transpose() * a / delta_c;
    let correct = |delta_w: f64| {
        let mut shifted = condensed.clone();
        for i in 0..nz {
            shifted[(i, i)] += delta_w;
        }
        shifted.cholesky().is_some()
    };

    let mut delta_w = 0.0;
    if !correct(0.0) {
        let (mut shift, growth) = if delta_w_last == 0.0 {
            (opts.first_hessian_perturbation, 100.0)
        } else {
            ((delta_w_last / 3.0).max(opts.min_hessian_perturbation), 8.0)
        };
        while !correct(shift) {
            shift *= growth;
            if shift > opts.max_hessian_perturbation {
                return None;
            }
        }
        delta_w = shift;
    }

    let mut shifted = primal.clone();
    for i in 0..nz {
        shifted[(i, i)] += delta_w;
    }
    Some((Factorization::new(&shifted, a, delta_c), delta_w))
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

fn one_norm(v: &DVector<f64>) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}

impl InteriorPoint {
    pub fn new(options: IpmOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    pub fn options(&self) -> &IpmOptions {
        &self.options
    }

    /// Current barrier parameter, if started.
    pub fn mu(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.mu)
    }

    /// Whether the solver runs on the problem's second derivatives.
    pub fn uses_exact_hessian(&self) -> Option<bool> {
        self.state.as_ref().map(|s| s.bfgs.is_none())
    }
}

fn relax(bound: f64, factor: f64, sign: f64) -> f64 {
    if bound.is_nan() || bound.abs() >= BOUND_INFINITY {
        sign * f64::INFINITY
    } else {
        bound + sign * factor * bound.abs().max(1.0)
    }
}

/// Move `v` strictly inside `[lower, upper]`.
fn push_inside(v: f64, lower: f64, upper: f64, push: f64, frac: f64) -> f64 {
    let mut pl = if lower.is_finite() {
        push * lower.abs().max(1.0)
    } else {
        0.0
    };
    let mut pu = if upper.is_finite() {
        push * upper.abs().max(1.0)
    } else {
        0.0
    };
    if lower.is_finite() && upper.is_finite() {
        pl = pl.min(frac * (upper - lower));
        pu = pu.min(frac * (upper - lower));
    }
    let mut out = v;
    if lower.is_finite() {
        out = out.max(lower + pl);
    }
    if upper.is_finite() {
        out = out.min(upper - pu);
    }
    if lower.is_finite() && upper.is_finite() && (out <= lower || out >= upper) {
        out = 0.5 * (lower + upper);
    }
    out
}

/// Largest step in `(0, 1]` keeping `v + alpha dv` a `tau` fraction away from the bounds.
fn fraction_to_boundary(
    v: &DVector<f64>,
    dv: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    tau: f64,
) -> f64 {
    let mut alpha: f64 = 1.0;
    for i in 0..v.len() {
        if lower[i].is_finite() && dv[i] < 0.0 {
            alpha = alpha.min(tau * (v[i] - lower[i]) / -dv[i]);
        }
        if upper[i].is_finite() && dv[i] > 0.0 {
            alpha = alpha.min(tau * (upper[i] - v[i]) / dv[i]);
        }
    }
    alpha.max(0.0)
}

/// Same rule for non-negative multipliers of finite bounds.
fn dual_fraction_to_boundary(
    v: &DVector<f64>,
    dv: &DVector<f64>,
    active: &DVector<f64>,
    tau: f64,
) -> f64 {
    let mut alpha: f64 = 1.0;
    for i in 0..v.len() {
        if active[i].is_finite() && dv[i] < 0.0 {
            alpha = alpha.min(tau * v[i] / -dv[i]);
        }
    }
    alpha.max(0.0)
}

impl State {
    fn nz(&self) -> usize {
        self.z.len()
    }

    fn x(&self, z: &DVector<f64>) -> Vec<f64> {
        z.rows(0, self.n).iter().copied().collect()
    }

    /// `c(z)`: equality residuals and `g - s` for inequality rows.
    fn residual(&self, g: &DVector<f64>, z: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(self.m, |i, _| match self.slack_of_row[i] {
            Some(k) => g[i] - z[self.n + k],
            None => g[i] - self.row_target[i],
        })
    }

    fn barrier(&self, z: &DVector<f64>) -> f64 {
        let mut total = 0.0;
        for i in 0..z.len() {
            if self.lower[i].is_finite() {
                let gap = z[i] - self.lower[i];
                if gap <= 0.0 {
                    return f64::INFINITY;
                }
                total -= gap.ln();
            }
            if self.upper[i].is_finite() {
                let gap = self.upper[i] - z[i];
                if gap <= 0.0 {
                    return f64::INFINITY;
                }
                total -= gap.ln();
            }
        }
        self.mu * total
    }

    /// Barrier objective; NaN counts as unbounded.
    fn phi(&self, f: f64, z: &DVector<f64>) -> f64 {
        let value = f + self.barrier(z);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }

    /// Gradient of `f(x) + barrier(z)` over `z`.
    fn barrier_gradient(&self) -> DVector<f64> {
        let mut out = DVector::zeros(self.nz());
        out.rows_mut(0, self.n).copy_from(&self.grad);
        for i in 0..self.nz() {
            if self.lower[i].is_finite() {
                out[i] -= self.mu / (self.z[i] - self.lower[i]);
            }
            if self.upper[i].is_finite() {
                out[i] += self.mu / (self.upper[i] - self.z[i]);
            }
        }
        out
    }

    /// `A' v` with `A = [J, -E]` (E selects the slack of each inequality row).
    fn at_times(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(self.nz());
        out.rows_mut(0, self.n).copy_from(&(self.jac.transpose() * v));
        for (i, slack) in self.slack_of_row.iter().enumerate() {
            if let Some(k) = slack {
                out[self.n + k] -= v[i];
            }
        }
        out
    }

    /// Dense `A = [J, -E]`.
    fn constraint_matrix(&self) -> DMatrix<f64> {
        let mut a = DMatrix::zeros(self.m, self.nz());
        a.view_mut((0, 0), (self.m, self.n)).copy_from(&self.jac);
        for (i, slack) in self.slack_of_row.iter().enumerate() {
            if let Some(k) = slack {
                a[(i, self.n + k)] = -1.0;
            }
        }
        a
    }

    fn sigma(&self) -> DVector<f64> {
        DVector::from_fn(self.nz(), |i, _| {
            let mut s = 0.0;
            if self.lower[i].is_finite() {
                s += self.zl[i] / (self.z[i] - self.lower[i]);
            }
            if self.upper[i].is_finite() {
                s += self.zu[i] / (self.upper[i] - self.z[i]);
            }
            s
        })
    }

    fn hessian(&self) -> &DMatrix<f64> {
        match &self.bfgs {
            Some(bfgs) => bfgs.matrix(),
            None => &self.w,
        }
    }

    /// `W + Sigma` over `z`.
    fn primal_block(&self, sigma: &DVector<f64>) -> DMatrix<f64> {
        let nz = self.nz();
        let mut h = DMatrix::zeros(nz, nz);
        h.view_mut((0, 0), (self.n, self.n))
            .copy_from(self.hessian());
        for i in 0..nz {
            h[(i, i)] += sigma[i];
        }
        h
    }

    /// Gradient of the Lagrangian over `x` only, excluding bound multipliers.
    fn lagrangian_gradient_x(
        grad: &DVector<f64>,
        jac: &DMatrix<f64>,
        lambda: &DVector<f64>,
    ) -> DVector<f64> {
        grad + jac.transpose() * lambda
    }

    /// Least-squares constraint multipliers for the current bound multipliers,
    /// or zero when they come out larger than `limit`.
    fn least_squares_multipliers(&self, limit: f64, delta_c: f64) -> DVector<f64> {
        let nz = self.nz();
        if self.m == 0 {
            return DVector::zeros(0);
        }
        let mut top = &self.zl - &self.zu;
        for i in 0..self.n {
            top[i] -= self.grad[i];
        }
        let fact = Factorization::new(
            &DMatrix::identity(nz, nz),
            &self.constraint_matrix(),
            delta_c,
        );
        match fact.solve(&top, &DVector::zeros(self.m)) {
            Some((_, lambda)) if inf_norm(&lambda) <= limit => lambda,
            _ => DVector::zeros(self.m),
        }
    }

    /// Scaled optimality error of the barrier problem for a given `mu`.
    fn optimality_error(&self, mu: f64) -> (f64, f64, f64) {
        let mut dual = self.at_times(&self.lambda) - &self.zl + &self.zu;
        for i in 0..self.n {
            dual[i] += self.grad[i];
        }
        let c = self.residual(&self.g, &self.z);

        let mut compl: f64 = 0.0;
        let mut z_sum = 0.0;
        let mut z_count = 0usize;
        for i in 0..self.nz() {
            if self.lower[i].is_finite() {
                compl = compl.max(((self.z[i] - self.lower[i]) * self.zl[i] - mu).abs());
                z_sum += self.zl[i];
                z_count += 1;
            }
            if self.upper[i].is_finite() {
                compl = compl.max(((self.upper[i] - self.z[i]) * self.zu[i] - mu).abs());
                z_sum += self.zu[i];
                z_count += 1;
            }
        }
        let s_d = ((one_norm(&self.lambda) + z_sum) / (self.m + z_count).max(1) as f64)
            .max(SCALING_MAX)
            / SCALING_MAX;
        let s_c = (z_sum / z_count.max(1) as f64).max(SCALING_MAX) / SCALING_MAX;

        let inf_du = inf_norm(&dual);
        let inf_pr = inf_norm(&c);
        let err = (inf_du / s_d).max(inf_pr).max(compl / s_c);
        (err, inf_pr, inf_du)
    }

    fn snapshot(&mut self) {
        let (_, inf_pr, inf_du) = self.optimality_error(0.0);
        let z_bounds: Vec<f64> = (0..self.n).map(|i| self.zu[i] - self.zl[i]).collect();
        self.current = SolverIterate {
            x: self.x(&self.z),
            lambda: self.lambda.iter().copied().collect(),
            z: z_bounds,
            objective: self.f,
            constraints: self.g.iter().copied().collect(),
            inf_pr,
            inf_du,
        };
    }

    fn trial(&self, problem: &dyn NlpProblem, z: &DVector<f64>) -> Option<Trial> {
        match problem.evaluate(&self.x(z)) {
            Ok((f, g)) => {
                let g = DVector::from_vec(g);
                let c = self.residual(&g, z);
                let theta = one_norm(&c);
                let phi = self.phi(f, z);
                Some(Trial {
                    f,
                    g,
                    c,
                    theta,
                    phi,
                })
            }
            Err(err) => {
                trace!(%err, "trial point rejected");
                None
            }
        }
    }

    /// Filter verdict on a trial point reached with step `alpha`.
    fn judge(
        &self,
        reference: Reference,
        theta: f64,
        phi: f64,
        alpha: f64,
        armijo: f64,
    ) -> Option<Acceptance> {
        if !theta.is_finite()
            || !phi.is_finite()
            || theta > self.theta_max
            || !self.filter.accepts(theta, phi)
        {
            return None;
        }
        let Reference {
            theta: theta0,
            phi: phi0,
            slope,
        } = reference;
        let switching = slope < 0.0
            && alpha * (-slope).powf(S_PHI) > SWITCH_DELTA * theta0.powf(S_THETA);
        if theta0 <= self.theta_min && switching {
            return (phi <= phi0 + armijo * alpha * slope).then_some(Acceptance::Objective);
        }
        (theta <= (1.0 - GAMMA_THETA) * theta0 || phi <= phi0 - GAMMA_PHI * theta0)
            .then_some(Acceptance::Filter)
    }

    /// Smallest step worth trying before the search is declared failed.
    fn alpha_min(&self, reference: Reference) -> f64 {
        let Reference { theta, slope, .. } = reference;
        let mut bound = GAMMA_THETA;
        if slope < 0.0 {
            bound = bound.min(GAMMA_PHI * theta / -slope);
            if theta <= self.theta_min {
                bound = bound.min(SWITCH_DELTA * theta.powf(S_THETA) / (-slope).powf(S_PHI));
            }
        }
        GAMMA_ALPHA * bound
    }

    /// Corrections of a trial at step `alpha` that increased `theta`.
    #[allow(clippy::too_many_arguments)]
    fn second_order_correction(
        &self,
        problem: &dyn NlpProblem,
        opts: &IpmOptions,
        fact: &Factorization,
        top: &DVector<f64>,
        c: &DVector<f64>,
        alpha: f64,
        rejected: &Trial,
        reference: Reference,
    ) -> Option<Step> {
        let mut c_soc = c * alpha + &rejected.c;
        let mut theta_old = rejected.theta;
        for p in 0..opts.max_soc {
            let (dz, dlambda) = fact.solve(top, &(-&c_soc))?;
            let a = fraction_to_boundary(&self.z, &dz, &self.lower, &self.upper, self.tau);
            let z = &self.z + &dz * a;
            let t = self.trial(problem, &z)?;
            if let Some(kind) = self.judge(reference, t.theta, t.phi, a, opts.armijo) {
                trace!(corrections = p + 1, "second-order correction accepted");
                return Some(Step {
                    alpha: a,
                    z,
                    lambda: &self.lambda + dlambda * a,
                    f: t.f,
                    g: t.g,
                    dz,
                    augment_filter: kind == Acceptance::Filter,
                });
            }
            if t.theta > opts.kappa_soc * theta_old {
                return None;
            }
            theta_old = t.theta;
            c_soc = c_soc * a + &t.c;
        }
        None
    }

    /// Step that only reduces `theta`: the minimum-norm correction of the
    /// linearized constraints, weighted by `Sigma + I` to respect the bounds.
    fn feasibility_step(
        &self,
        problem: &dyn NlpProblem,
        opts: &IpmOptions,
        sigma: &DVector<f64>,
        a: &DMatrix<f64>,
        c: &DVector<f64>,
        reference: Reference,
    ) -> Option<Step> {
        let nz = self.nz();
        let mut primal = DMatrix::from_diagonal(sigma);
        for i in 0..nz {
            primal[(i, i)] += FEASIBILITY_DAMPING;
        }
        let fact = Factorization::new(&primal, a, opts.dual_regularization);
        let (dz, _) = fact.solve(&DVector::zeros(nz), &(-c))?;

        let mut filter = self.filter.clone();
        filter.augment(reference.theta, reference.phi);
        let mut alpha = fraction_to_boundary(&self.z, &dz, &self.lower, &self.upper, self.tau);
        for _ in 0..opts.max_line_search {
            let z = &self.z + &dz * alpha;
            if let Some(t) = self.trial(problem, &z) {
                if t.phi.is_finite()
                    && t.theta <= (1.0 - GAMMA_THETA) * reference.theta
                    && filter.accepts(t.theta, t.phi)
                {
                    return Some(Step {
                        alpha,
                        z,
                        lambda: self.lambda.clone(),
                        f: t.f,
                        g: t.g,
                        dz,
                        augment_filter: true,
                    });
                }
            }
            alpha *= 0.5;
        }
        None
    }
}

impl InteriorPoint {
    fn check_point(x: &[f64], what: &'static str) -> NlpResult<()> {
        match x.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(NlpError::NonFinite { what, index }),
            None => Ok(()),
        }
    }
}

fn dense_jacobian(problem: &dyn NlpProblem, x: &[f64]) -> NlpResult<DMatrix<f64>> {
    let pattern = problem.jacobian_sparsity();
    let values = problem.jacobian_values(x)?;
    let mut jac = DMatrix::zeros(problem.num_constraints(), problem.num_variables());
    for ((&r, &c), v) in pattern.rows().iter().zip(pattern.cols()).zip(values) {
        jac[(r, c)] = v;
    }
    Ok(jac)
}

/// Symmetric dense Lagrangian Hessian, `None` when the problem has none.
fn dense_hessian(
    problem: &dyn NlpProblem,
    x: &[f64],
    lambda: &DVector<f64>,
) -> NlpResult<Option<DMatrix<f64>>> {
    let Some(pattern) = problem.hessian_sparsity() else {
        return Ok(None);
    };
    let values = match problem.hessian_values(x, 1.0, lambda.as_slice()) {
        Ok(values) => values,
        Err(NlpError::Unsupported { .. }) => return Ok(None),
        Err(err) => return Err(err),
    };
    let n = problem.num_variables();
    let mut w = DMatrix::zeros(n, n);
    for ((&r, &c), v) in pattern.rows().iter().zip(pattern.cols()).zip(values) {
        w[(r, c)] = v;
        w[(c, r)] = v;
    }
    Ok(Some(w))
}

impl NlpSolver for InteriorPoint {
    fn start(&mut self, problem: &dyn NlpProblem, x0: &[f64]) -> NlpResult<()> {
        let n = problem.num_variables();
        let m = problem.num_constraints();
        if x0.len() != n {
            return Err(NlpError::Dimension {
                what: "initial point",
                expected: n,
                actual: x0.len(),
            });
        }
        Self::check_point(x0, "initial point")?;
        let opts = &self.options;

        let (xl, xu) = problem.variable_bounds();
        let (gl, gu) = problem.constraint_bounds();

        let mut slack_of_row = Vec::with_capacity(m);
        let mut row_target = vec![0.0; m];
        let mut slack_bounds = Vec::new();
        for i in 0..m {
            if gl[i] == gu[i] {
                slack_of_row.push(None);
                row_target[i] = gl[i];
            } else {
                slack_of_row.push(Some(slack_bounds.len()));
                slack_bounds.push((gl[i], gu[i]));
            }
        }
        let ns = slack_bounds.len();
        let nz = n + ns;

        let lower = DVector::from_fn(nz, |i, _| {
            let b = if i < n { xl[i] } else { slack_bounds[i - n].0 };
            relax(b, opts.bound_relax_factor, -1.0)
        });
        let upper = DVector::from_fn(nz, |i, _| {
            let b = if i < n { xu[i] } else { slack_bounds[i - n].1 };
            relax(b, opts.bound_relax_factor, 1.0)
        });

        let x: Vec<f64> = (0..n)
            .map(|i| push_inside(x0[i], lower[i], upper[i], opts.bound_push, opts.bound_frac))
            .collect();
        let (f, g) = problem.evaluate(&x)?;
        let g = DVector::from_vec(g);
        let grad = DVector::from_vec(problem.objective_gradient(&x)?);
        let jac = dense_jacobian(problem, &x)?;
        Self::check_point(&[f], "initial objective")?;
        Self::check_point(g.as_slice(), "initial constraints")?;

        let mut z = DVector::zeros(nz);
        for i in 0..n {
            z[i] = x[i];
        }
        for (i, slack) in slack_of_row.iter().enumerate() {
            if let Some(k) = slack {
                let idx = n + k;
                z[idx] = push_inside(g[i], lower[idx], upper[idx], opts.bound_push, opts.bound_frac);
            }
        }
        let zl = DVector::from_fn(nz, |i, _| if lower[i].is_finite() { 1.0 } else { 0.0 });
        let zu = DVector::from_fn(nz, |i, _| if upper[i].is_finite() { 1.0 } else { 0.0 });

        let mu = opts.mu_init;
        let mut state = State {
            n,
            m,
            slack_of_row,
            row_target,
            lower,
            upper,
            z,
            lambda: DVector::zeros(m),
            zl,
            zu,
            f,
            g,
            grad,
            jac,
            w: DMatrix::zeros(n, n),
            bfgs: None,
            mu,
            tau: opts.tau_min.max(1.0 - mu),
            filter: Filter::default(),
            theta_max: 0.0,
            theta_min: 0.0,
            delta_w_last: 0.0,
            force_mu_decrease: false,
            iteration: 0,
            acceptable_count: 0,
            current: SolverIterate {
                x: Vec::new(),
                lambda: Vec::new(),
                z: Vec::new(),
                objective: f,
                constraints: Vec::new(),
                inf_pr: 0.0,
                inf_du: 0.0,
            },
        };
        state.lambda =
            state.least_squares_multipliers(opts.constr_mult_init_max, opts.dual_regularization);

        let exact = match opts.hessian_approximation {
            HessianApproximation::Exact => dense_hessian(problem, &x, &state.lambda)?,
            HessianApproximation::Bfgs => None,
        };
        match exact {
            Some(w) => state.w = w,
            None => state.bfgs = Some(DampedBfgs::new(n)),
        }

        let theta0 = one_norm(&state.residual(&state.g, &state.z));
        state.theta_max = 1e4 * theta0.max(1.0);
        state.theta_min = 1e-4 * theta0.max(1.0);
        state.snapshot();
        debug!(
            variables = n,
            constraints = m,
            slacks = ns,
            exact_hessian = state.bfgs.is_none(),
            theta0,
            "interior point started"
        );
        self.state = Some(state);
        Ok(())
    }

    fn iterate(&mut self, problem: &dyn NlpProblem) -> NlpResult<IterationReport> {
        let opts = self.options.clone();
        let st = self.state.as_mut().ok_or(NlpError::NotStarted)?;
        st.iteration += 1;
        let iteration = st.iteration;

        let report = |st: &State, status: IterationStatus, alpha: f64, trials: usize| {
            let (_, inf_pr, inf_du) = st.optimality_error(0.0);
            IterationReport {
                iteration,
                objective: st.f,
                inf_pr,
                inf_du,
                mu: st.mu,
                alpha_pr: alpha,
                ls_trials: trials,
                status,
            }
        };

        // Convergence of the original problem.
        let (err0, _, _) = st.optimality_error(0.0);
        if err0 <= opts.tol {
            return Ok(report(&*st, IterationStatus::Converged, 0.0, 0));
        }
        if err0 <= opts.acceptable_tol {
            st.acceptable_count += 1;
            if st.acceptable_count >= opts.acceptable_iter {
                return Ok(report(&*st, IterationStatus::Converged, 0.0, 0));
            }
        } else {
            st.acceptable_count = 0;
        }

        // Monotone barrier update; each new barrier problem starts a new filter.
        let mu_min = opts.tol / 10.0;
        let mut force = std::mem::take(&mut st.force_mu_decrease);
        loop {
            let (err_mu, _, _) = st.optimality_error(st.mu);
            if st.mu <= mu_min || (!force && err_mu > opts.barrier_tol_factor * st.mu) {
                break;
            }
            force = false;
            let next = (opts.mu_linear_decrease * st.mu)
                .min(st.mu.powf(opts.mu_superlinear_power))
                .max(mu_min);
            st.mu = next;
            st.tau = opts.tau_min.max(1.0 - next);
            st.filter.clear();
            trace!(mu = next, "barrier parameter decreased");
        }

        // Search direction.
        let sigma = st.sigma();
        let grad_phi = st.barrier_gradient();
        let top = -(&grad_phi + st.at_times(&st.lambda));
        let c = st.residual(&st.g, &st.z);
        let a = st.constraint_matrix();
        let Some((fact, delta_w)) =
            factor_with_inertia(&st.primal_block(&sigma), &a, &opts, st.delta_w_last)
        else {
            return Err(NlpError::Numeric {
                what: format!("no Hessian shift corrects the KKT inertia at iteration {iteration}"),
            });
        };
        if delta_w > 0.0 {
            st.delta_w_last = delta_w;
            trace!(iteration, delta_w, "hessian shifted");
        }
        let Some((dz, dlambda)) = fact.solve(&top, &(-&c)) else {
            return Err(NlpError::Numeric {
                what: format!("KKT system singular at iteration {iteration}"),
            });
        };

        let reference = Reference {
            theta: one_norm(&c),
            phi: st.phi(st.f, &st.z),
            slope: grad_phi.dot(&dz),
        };
        let tiny = reference.theta <= opts.constr_viol_tol
            && dz
                .iter()
                .zip(st.z.iter())
                .all(|(d, v)| d.abs() <= TINY_STEP * (1.0 + v.abs()));
        if tiny {
            st.force_mu_decrease = true;
            trace!(iteration, "tiny step");
        }

        // Filter line search.
        let alpha_max = fraction_to_boundary(&st.z, &dz, &st.lower, &st.upper, st.tau);
        let alpha_min = if tiny { 0.0 } else { st.alpha_min(reference) };
        let mut alpha = alpha_max;
        let mut trials = 0;
        let mut accepted = None;
        while trials < opts.max_line_search && alpha >= alpha_min {
            trials += 1;
            let z_trial = &st.z + &dz * alpha;
            if let Some(t) = st.trial(problem, &z_trial) {
                let verdict = if tiny && t.phi.is_finite() {
                    Some(Acceptance::Objective)
                } else {
                    st.judge(reference, t.theta, t.phi, alpha, opts.armijo)
                };
                if let Some(kind) = verdict {
                    accepted = Some(Step {
                        alpha,
                        z: z_trial,
                        lambda: &st.lambda + &dlambda * alpha,
                        f: t.f,
                        g: t.g,
                        dz: dz.clone(),
                        augment_filter: kind == Acceptance::Filter,
                    });
                    break;
                }
                if t.theta >= reference.theta {
                    let soc = st.second_order_correction(
                        problem, &opts, &fact, &top, &c, alpha, &t, reference,
                    );
                    if soc.is_some() {
                        accepted = soc;
                        break;
                    }
                }
            }
            alpha *= 0.5;
        }

        if accepted.is_none() {
            if let Some(bfgs) = st.bfgs.as_mut() {
                if !bfgs.is_fresh() {
                    debug!(iteration, "line search failed, resetting Hessian approximation");
                    bfgs.reset();
                    return Ok(report(&*st, IterationStatus::Continue, 0.0, trials));
                }
            }
            if reference.theta > opts.tol {
                accepted = st.feasibility_step(problem, &opts, &sigma, &a, &c, reference);
                if accepted.is_some() {
                    debug!(iteration, theta = reference.theta, "feasibility step taken");
                }
            }
        }
        let Some(step) = accepted else {
            let (_, inf_pr, _) = st.optimality_error(0.0);
            let status = if inf_pr > opts.constr_viol_tol {
                IterationStatus::Infeasible
            } else {
                IterationStatus::Stalled
            };
            debug!(iteration, ?status, inf_pr, "line search failed");
            return Ok(report(&*st, status, 0.0, trials));
        };
        if step.augment_filter {
            st.filter.augment(reference.theta, reference.phi);
        }

        // Bound multipliers from the primal-dual direction.
        let nz = st.nz();
        let mut dzl = DVector::zeros(nz);
        let mut dzu = DVector::zeros(nz);
        for i in 0..nz {
            if st.lower[i].is_finite() {
                let gap = st.z[i] - st.lower[i];
                dzl[i] = st.mu / gap - st.zl[i] - st.zl[i] / gap * step.dz[i];
            }
            if st.upper[i].is_finite() {
                let gap = st.upper[i] - st.z[i];
                dzu[i] = st.mu / gap - st.zu[i] + st.zu[i] / gap * step.dz[i];
            }
        }
        let alpha_z = dual_fraction_to_boundary(&st.zl, &dzl, &st.lower, st.tau)
            .min(dual_fraction_to_boundary(&st.zu, &dzu, &st.upper, st.tau));
        let mut zl = &st.zl + &dzl * alpha_z;
        let mut zu = &st.zu + &dzu * alpha_z;
        for i in 0..nz {
            if st.lower[i].is_finite() {
                let base = st.mu / (step.z[i] - st.lower[i]);
                zl[i] = zl[i].clamp(base / KAPPA_SIGMA, base * KAPPA_SIGMA);
            }
            if st.upper[i].is_finite() {
                let base = st.mu / (st.upper[i] - step.z[i]);
                zu[i] = zu[i].clamp(base / KAPPA_SIGMA, base * KAPPA_SIGMA);
            }
        }

        // Derivatives at the new point.
        let x_new = st.x(&step.z);
        let grad_new = DVector::from_vec(problem.objective_gradient(&x_new)?);
        let jac_new = dense_jacobian(problem, &x_new)?;
        if st.bfgs.is_some() {
            let s = (&step.z - &st.z).rows(0, st.n).into_owned();
            let y = State::lagrangian_gradient_x(&grad_new, &jac_new, &step.lambda)
                - State::lagrangian_gradient_x(&st.grad, &st.jac, &step.lambda);
            if let Some(bfgs) = st.bfgs.as_mut() {
                bfgs.update(&s, &y);
            }
        } else if let Some(w) = dense_hessian(problem, &x_new, &step.lambda)? {
            st.w = w;
        }

        let alpha = step.alpha;
        st.z = step.z;
        st.lambda = step.lambda;
        st.zl = zl;
        st.zu = zu;
        st.f = step.f;
        st.g = step.g;
        st.grad = grad_new;
        st.jac = jac_new;
        st.snapshot();

        let x_max = inf_norm(&st.z.rows(0, st.n).into_owned());
        let status = if !st.f.is_finite()
            || st.f.abs() > opts.divergence_limit
            || x_max > opts.divergence_limit
        {
            IterationStatus::Diverged
        } else {
            IterationStatus::Continue
        };
        let rep = report(&*st, status, alpha, trials);
        trace!(
            iteration,
            objective = rep.objective,
            inf_pr = rep.inf_pr,
            inf_du = rep.inf_du,
            mu = rep.mu,
            alpha,
            filter = st.filter.len(),
            "ipm iteration"
        );
        Ok(rep)
    }

    fn current(&self) -> Option<&SolverIterate> {
        self.state.as_ref().map(|s| &s.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_inside_respects_both_bounds() {
        assert_eq!(push_inside(0.0, 1.0, 5.0, 1e-2, 1e-2), 1.01);
        // Relative push 1e-2 * 4 = 0.04 beats the absolute 1e-2 * 5 = 0.05.
        assert!((push_inside(9.0, 1.0, 5.0, 1e-2, 1e-2) - 4.96).abs() < 1e-12);
        // Absolute push 1e-2 * 5 = 0.05 beats the relative 1e-2 * 100 = 1.0.
        assert!((push_inside(9.0, -95.0, 5.0, 1e-2, 1e-2) - 4.95).abs() < 1e-12);
        assert_eq!(push_inside(3.0, f64::NEG_INFINITY, f64::INFINITY, 1e-2, 1e-2), 3.0);
        let v = push_inside(0.0, 0.0, 1e-6, 1e-2, 1e-2);
        assert!(v > 0.0 && v < 1e-6);
    }

    #[test]
    fn fraction_to_boundary_stops_short_of_bounds() {
        let v = DVector::from_vec(vec![1.0, 0.5]);
        let dv = DVector::from_vec(vec![-2.0, 0.1]);
        let lo = DVector::from_vec(vec![0.0, f64::NEG_INFINITY]);
        let hi = DVector::from_vec(vec![f64::INFINITY, 0.6]);
        let a = fraction_to_boundary(&v, &dv, &lo, &hi, 0.99);
        assert!((a - 0.495).abs() < 1e-12);
    }

    #[test]
    fn filter_rejects_dominated_points() {
        let mut filter = Filter::default();
        assert!(filter.accepts(1e9, 1e9));
        filter.augment(1.0, 5.0);
        assert!(filter.accepts(0.5, 10.0));
        assert!(filter.accepts(2.0, 4.0));
        assert!(!filter.accepts(1.0, 5.0));
        assert!(!filter.accepts(2.0, 6.0));

        // A dominating entry replaces the ones it covers.
        filter.augment(3.0, 1.0);
        assert_eq!(filter.len(), 2);
        filter.augment(0.5, 0.5);
        assert_eq!(filter.len(), 1);
        filter.clear();
        assert!(filter.accepts(1.0, 5.0));
    }

    #[test]
    fn inertia_correction_shifts_only_negative_curvature() {
        let opts = IpmOptions::default();
        let primal = DMatrix::from_diagonal(&DVector::from_vec(vec![-1.0, 1.0]));

        // The constraint pins the negatively curved direction.
        let pinned = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
        let (_, dw) = factor_with_inertia(&primal, &pinned, &opts, 0.0).unwrap();
        assert_eq!(dw, 0.0);

        // Here it is free, so the block must be shifted past its curvature.
        let free = DMatrix::from_row_slice(1, 2, &[0.0, 1.0]);
        let (fact, dw) = factor_with_inertia(&primal, &free, &opts, 0.0).unwrap();
        assert!(dw > 1.0);
        let top = DVector::from_vec(vec![1.0, 0.0]);
        let bottom = DVector::from_vec(vec![0.0]);
        let (dz, _) = fact.solve(&top, &bottom).unwrap();
        // Positive curvature after the shift.
        assert!(dz[0] > 0.0);
        assert!(dz[1].abs() < 1e-6);
    }

    #[test]
    fn unstarted_solver_has_no_iterate() {
        let solver = InteriorPoint::default();
        assert!(solver.current().is_none());
        assert!(solver.mu().is_none());
        assert!(solver.uses_exact_hessian().is_none());
    }
}
