//! Explicit time integrators.

use crate::error::SimResult;
use crate::model::TransientModel;

/// One fixed step of size `dt`.
pub trait Integrator {
    fn step<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &M::State,
        dt: f64,
    ) -> SimResult<M::State>;
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct RK4;

impl Integrator for RK4 {
    fn step<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &M::State,
        dt: f64,
    ) -> SimResult<M::State> {
        let k1 = model.rhs(t, x)?;

        let x2 = model.add(x, &model.scale(&k1, 0.5 * dt));
        let k2 = model.rhs(t + 0.5 * dt, &x2)?;

        let x3 = model.add(x, &model.scale(&k2, 0.5 * dt));
        let k3 = model.rhs(t + 0.5 * dt, &x3)?;

        let x4 = model.add(x, &model.scale(&k3, dt));
        let k4 = model.rhs(t + dt, &x4)?;

        let k_sum = model.add(
            &model.add(&k1, &model.scale(&k2, 2.0)),
            &model.add(&model.scale(&k3, 2.0), &k4),
        );

        Ok(model.add(x, &model.scale(&k_sum, dt / 6.0)))
    }
}

/// Forward Euler (explicit, 1st order, fast for testing).
#[derive(Clone, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn step<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &M::State,
        dt: f64,
    ) -> SimResult<M::State> {
        let xdot = model.rhs(t, x)?;
        Ok(model.add(x, &model.scale(&xdot, dt)))
    }
}

const DP_C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const DP_A: [&[f64]; 7] = [
    &[],
    &[1.0 / 5.0],
    &[3.0 / 40.0, 9.0 / 40.0],
    &[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
    &[
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
    ],
    &[
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
    ],
    &[
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];

/// Difference between the 5th and embedded 4th order weights.
const DP_E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// `x + h * sum(coef_i * k_i)`, skipping zero weights.
fn combine<M: TransientModel>(
    model: &M,
    x: &M::State,
    h: f64,
    coefs: &[f64],
    k: &[M::State],
) -> M::State {
    let mut acc = x.clone();
    for (c, ki) in coefs.iter().zip(k) {
        if *c != 0.0 {
            acc = model.add(&acc, &model.scale(ki, h * c));
        }
    }
    acc
}

/// Dormand-Prince 5(4) pair with local extrapolation.
#[derive(Clone, Debug)]
pub struct DormandPrince45 {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for DormandPrince45 {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-10,
        }
    }
}

/// Result of one trial step.
#[derive(Clone, Debug)]
pub struct TrialStep<S> {
    pub x: S,
    /// Weighted error norm; the step is acceptable when `<= 1`.
    pub error: f64,
}

impl DormandPrince45 {
    pub fn attempt<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &M::State,
        h: f64,
    ) -> SimResult<TrialStep<M::State>> {
        let mut k: Vec<M::State> = Vec::with_capacity(7);
        k.push(model.rhs(t, x)?);
        for stage in 1..7 {
            let xs = combine(model, x, h, DP_A[stage], &k);
            k.push(model.rhs(t + DP_C[stage] * h, &xs)?);
        }
        // The last stage evaluates the 5th order solution itself.
        let x_new = combine(model, x, h, DP_A[6], &k);
        let err = combine(model, &model.scale(x, 0.0), h, &DP_E, &k);
        let error = model.error_norm(&err, x, &x_new, self.rtol, self.atol);
        Ok(TrialStep { x: x_new, error })
    }

    /// Step size factor for the next attempt given an error norm.
    pub fn step_factor(error: f64) -> f64 {
        if !error.is_finite() {
            return 0.2;
        }
        if error == 0.0 {
            return 5.0;
        }
        (0.9 * error.powf(-0.2)).clamp(0.2, 5.0)
    }
}

impl Integrator for DormandPrince45 {
    fn step<M: TransientModel>(
        &self,
        model: &mut M,
        t: f64,
        x: &M::State,
        dt: f64,
    ) -> SimResult<M::State> {
        Ok(self.attempt(model, t, x, dt)?.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;

    /// `x_dot = lambda * x` on a scalar state.
    struct Exponential {
        lambda: f64,
    }

    impl TransientModel for Exponential {
        type State = f64;

        fn initial_state(&self) -> f64 {
            1.0
        }

        fn rhs(&mut self, _t: f64, x: &f64) -> SimResult<f64> {
            if !x.is_finite() {
                return Err(SimError::NonFinite { t: 0.0 });
            }
            Ok(self.lambda * x)
        }

        fn add(&self, a: &f64, b: &f64) -> f64 {
            a + b
        }

        fn scale(&self, a: &f64, scale: f64) -> f64 {
            a * scale
        }

        fn error_norm(&self, err: &f64, x0: &f64, x1: &f64, rtol: f64, atol: f64) -> f64 {
            err.abs() / (atol + rtol * x0.abs().max(x1.abs()))
        }

        fn is_finite(&self, x: &f64) -> bool {
            x.is_finite()
        }
    }

    #[test]
    fn rk4_is_fourth_order_accurate() {
        let mut model = Exponential { lambda: -1.0 };
        let x = RK4.step(&mut model, 0.0, &1.0, 0.1).unwrap();
        assert!((x - (-0.1f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn euler_step() {
        let mut model = Exponential { lambda: 2.0 };
        let x = ForwardEuler.step(&mut model, 0.0, &1.0, 0.5).unwrap();
        assert_eq!(x, 2.0);
    }

    #[test]
    fn dormand_prince_error_estimate_tracks_true_error() {
        let mut model = Exponential { lambda: -1.0 };
        let dp = DormandPrince45::default();
        let small = dp.attempt(&mut model, 0.0, &1.0, 0.01).unwrap();
        let large = dp.attempt(&mut model, 0.0, &1.0, 0.5).unwrap();
        assert!((small.x - (-0.01f64).exp()).abs() < 1e-13);
        assert!((large.x - (-0.5f64).exp()).abs() < 1e-4);
        assert!(small.error < 1.0);
        assert!(large.error > small.error);
    }

    #[test]
    fn step_factor_is_bounded() {
        assert_eq!(DormandPrince45::step_factor(0.0), 5.0);
        assert_eq!(DormandPrince45::step_factor(f64::INFINITY), 0.2);
        assert_eq!(DormandPrince45::step_factor(1e12), 0.2);
        let f = DormandPrince45::step_factor(1.0);
        assert!((f - 0.9).abs() < 1e-12);
    }
}
