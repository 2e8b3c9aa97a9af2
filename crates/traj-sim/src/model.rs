//! TransientModel trait for pluggable dynamic systems.

use crate::error::SimResult;

/// A dynamic system `x_dot = f(t, x)` with its own state arithmetic.
pub trait TransientModel {
    type State: Clone;

    /// State at the start time of the run.
    fn initial_state(&self) -> Self::State;

    /// State derivative at `(t, x)`.
    ///
    /// Takes `&mut self` so models can keep scratch buffers between calls.
    fn rhs(&mut self, t: f64, x: &Self::State) -> SimResult<Self::State>;

    /// Element-wise `a + b`.
    fn add(&self, a: &Self::State, b: &Self::State) -> Self::State;

    /// `scale * a`.
    fn scale(&self, a: &Self::State, scale: f64) -> Self::State;

    /// RMS of `err` weighted by `atol + rtol * max(|x0|, |x1|)`.
    fn error_norm(
        &self,
        err: &Self::State,
        x0: &Self::State,
        x1: &Self::State,
        rtol: f64,
        atol: f64,
    ) -> f64;

    fn is_finite(&self, x: &Self::State) -> bool;
}
