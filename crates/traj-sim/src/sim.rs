//! Simulation runner and result recording.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::integrator::{DormandPrince45, ForwardEuler, Integrator, RK4};
use crate::model::TransientModel;

/// Integrator selection for simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorType {
    /// Adaptive Dormand-Prince 5(4) with its own step control.
    #[default]
    DormandPrince45,
    /// 4th-order Runge-Kutta, fixed step.
    RK4,
    /// Forward Euler, fixed step.
    ForwardEuler,
}

/// Options for simulation runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    pub t_start: f64,
    pub t_end: f64,
    /// Fixed step, or the first trial step of the adaptive integrator.
    pub dt: f64,
    /// Smallest step the adaptive integrator may take.
    pub dt_min: f64,
    /// Maximum number of steps, rejected ones included.
    pub max_steps: usize,
    /// Record every N-th accepted step. The final state is always recorded.
    pub record_every: usize,
    pub integrator: IntegratorType,
    pub rtol: f64,
    pub atol: f64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 1.0,
            dt: 1e-3,
            dt_min: 1e-12,
            max_steps: 100_000,
            record_every: 1,
            integrator: IntegratorType::default(),
            rtol: 1e-8,
            atol: 1e-10,
        }
    }
}

impl SimOptions {
    fn validate(&self) -> SimResult<()> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "dt must be positive",
            });
        }
        if !self.t_start.is_finite() || !self.t_end.is_finite() || self.t_end < self.t_start {
            return Err(SimError::InvalidArg {
                what: "t_end must not precede t_start",
            });
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidArg {
                what: "max_steps must be positive",
            });
        }
        if self.record_every == 0 {
            return Err(SimError::InvalidArg {
                what: "record_every must be positive",
            });
        }
        let bad_tolerance = [self.rtol, self.dt_min]
            .iter()
            .any(|v| v.is_nan() || *v <= 0.0)
            || self.atol.is_nan()
            || self.atol < 0.0;
        if self.integrator == IntegratorType::DormandPrince45 && bad_tolerance {
            return Err(SimError::InvalidArg {
                what: "adaptive tolerances must be positive",
            });
        }
        Ok(())
    }
}

/// Record of simulation results.
#[derive(Clone, Debug)]
pub struct SimRecord<S> {
    pub t: Vec<f64>,
    pub x: Vec<S>,
    /// Accepted steps.
    pub steps: usize,
    /// Rejected adaptive trial steps.
    pub rejected: usize,
}

impl<S: Clone> SimRecord<S> {
    fn start(t: f64, x: &S) -> Self {
        Self {
            t: vec![t],
            x: vec![x.clone()],
            steps: 0,
            rejected: 0,
        }
    }

    fn accept(&mut self, t: f64, x: &S, record_every: usize, last: bool) {
        self.steps += 1;
        if last || self.steps % record_every == 0 {
            self.t.push(t);
            self.x.push(x.clone());
        }
    }

    pub fn final_state(&self) -> Option<&S> {
        self.x.last()
    }
}

/// Integrate `model` from `opts.t_start` to `opts.t_end`.
pub fn run_sim<M: TransientModel>(
    model: &mut M,
    opts: &SimOptions,
) -> SimResult<SimRecord<M::State>> {
    opts.validate()?;
    let x = model.initial_state();
    if !model.is_finite(&x) {
        return Err(SimError::NonFinite { t: opts.t_start });
    }
    let record = match opts.integrator {
        IntegratorType::RK4 => run_fixed(model, &RK4, x, opts)?,
        IntegratorType::ForwardEuler => run_fixed(model, &ForwardEuler, x, opts)?,
        IntegratorType::DormandPrince45 => run_adaptive(model, x, opts)?,
    };
    debug!(
        steps = record.steps,
        rejected = record.rejected,
        points = record.t.len(),
        "simulation finished"
    );
    Ok(record)
}

/// Span below which the remaining interval is treated as covered.
fn end_tolerance(opts: &SimOptions) -> f64 {
    1e-12 * opts.t_end.abs().max(opts.t_end - opts.t_start).max(1.0)
}

fn run_fixed<M: TransientModel, I: Integrator>(
    model: &mut M,
    integrator: &I,
    mut x: M::State,
    opts: &SimOptions,
) -> SimResult<SimRecord<M::State>> {
    let mut t = opts.t_start;
    let mut record = SimRecord::start(t, &x);
    let eps = end_tolerance(opts);
    while opts.t_end - t > eps {
        if record.steps >= opts.max_steps {
            return Err(SimError::StepLimit {
                max_steps: opts.max_steps,
                t,
            });
        }
        let dt = opts.dt.min(opts.t_end - t);
        x = integrator.step(model, t, &x, dt)?;
        let last = opts.t_end - (t + dt) <= eps;
        t = if last { opts.t_end } else { t + dt };
        if !model.is_finite(&x) {
            return Err(SimError::NonFinite { t });
        }
        record.accept(t, &x, opts.record_every, last);
    }
    Ok(record)
}

fn run_adaptive<M: TransientModel>(
    model: &mut M,
    mut x: M::State,
    opts: &SimOptions,
) -> SimResult<SimRecord<M::State>> {
    let dp = DormandPrince45 {
        rtol: opts.rtol,
        atol: opts.atol,
    };
    let mut t = opts.t_start;
    let mut h = opts.dt;
    let mut record = SimRecord::start(t, &x);
    let eps = end_tolerance(opts);
    while opts.t_end - t > eps {
        if record.steps + record.rejected >= opts.max_steps {
            return Err(SimError::StepLimit {
                max_steps: opts.max_steps,
                t,
            });
        }
        let remaining = opts.t_end - t;
        let h_try = h.min(remaining);
        let trial = dp.attempt(model, t, &x, h_try)?;
        let factor = DormandPrince45::step_factor(trial.error);
        if trial.error <= 1.0 && model.is_finite(&trial.x) {
            let last = remaining - h_try <= eps;
            t = if last { opts.t_end } else { t + h_try };
            x = trial.x;
            record.accept(t, &x, opts.record_every, last);
            // Keep the grown step when the last one was cut short by the end.
            h = h.max(h_try) * factor.min(5.0);
        } else {
            record.rejected += 1;
            h = h_try * factor.min(0.9);
            if h < opts.dt_min {
                return Err(SimError::StepSizeUnderflow { t, h });
            }
        }
    }
    Ok(record)
}
