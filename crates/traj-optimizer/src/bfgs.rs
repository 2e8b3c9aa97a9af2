//! Damped BFGS approximation of the Lagrangian Hessian.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Powell-damped BFGS. The approximation stays symmetric positive definite
/// even when the curvature condition `s'y > 0` fails.
///
/// Damping keeps the matrix positive definite but stops it learning; after
/// [`STALL_LIMIT`] consecutive damped or skipped updates it restarts from a
/// scaled identity.
#[derive(Clone, Debug)]
pub struct DampedBfgs {
    b: DMatrix<f64>,
    updates: usize,
    stalled: usize,
}

const DAMPING: f64 = 0.2;
pub const STALL_LIMIT: usize = 5;

impl DampedBfgs {
    pub fn new(n: usize) -> Self {
        Self {
            b: DMatrix::identity(n, n),
            updates: 0,
            stalled: 0,
        }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub fn is_fresh(&self) -> bool {
        self.updates == 0
    }

    pub fn reset(&mut self) {
        let n = self.b.nrows();
        self.b = DMatrix::identity(n, n);
        self.updates = 0;
        self.stalled = 0;
    }

    /// Consecutive updates that were damped or skipped.
    pub fn stalled(&self) -> usize {
        self.stalled
    }

    fn stall(&mut self) {
        self.stalled += 1;
        if self.stalled >= STALL_LIMIT {
            debug!(stalled = self.stalled, "bfgs stalled, restarting");
            self.reset();
        }
    }

    /// Update with step `s` and gradient change `y`. Returns false when skipped.
    pub fn update(&mut self, s: &DVector<f64>, y: &DVector<f64>) -> bool {
        let ss = s.dot(s);
        if ss < 1e-24 {
            return false;
        }
        if !y.iter().all(|v| v.is_finite()) {
            self.stall();
            return false;
        }
        if self.updates == 0 {
            let sy = s.dot(y);
            if sy > 0.0 {
                let scale = (y.dot(y) / sy).clamp(1e-4, 1e6);
                let n = self.b.nrows();
                self.b = DMatrix::identity(n, n) * scale;
            }
        }

        let bs = &self.b * s;
        let sbs = s.dot(&bs);
        if sbs <= 0.0 {
            self.stall();
            return false;
        }
        let sy = s.dot(y);
        let theta = if sy >= DAMPING * sbs {
            1.0
        } else {
            (1.0 - DAMPING) * sbs / (sbs - sy)
        };
        let r = y * theta + &bs * (1.0 - theta);
        let sr = s.dot(&r);
        if sr <= 1e-12 * sbs {
            self.stall();
            return false;
        }

        self.b += &r * r.transpose() / sr - &bs * bs.transpose() / sbs;
        // Keep it exactly symmetric.
        let bt = self.b.transpose();
        self.b = (&self.b + bt) * 0.5;
        self.updates += 1;
        if theta < 1.0 {
            self.stall();
        } else {
            self.stalled = 0;
        }
        true
    }
}
