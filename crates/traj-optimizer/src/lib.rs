//! Dense primal-dual interior point solver for the transcribed NLP.
//!
//! The solver exposes one iteration per call so the caller owns the loop,
//! the iteration budget and the wall-clock deadline. Steps are globalized
//! with a filter line search; the KKT matrix is inertia-corrected so exact
//! (possibly indefinite) Lagrangian Hessians can be used directly.

pub mod bfgs;
pub mod ipm;
pub mod options;

pub use bfgs::DampedBfgs;
pub use ipm::InteriorPoint;
pub use options::{HessianApproximation, IpmOptions};
