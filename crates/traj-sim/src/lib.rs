//! Explicit time simulation of optimized trajectories.
//!
//! Provides:
//! - fixed-step RK4 and forward Euler, adaptive Dormand-Prince 5(4)
//! - a generic `TransientModel` run loop with decimated recording
//! - per-segment Lagrange reconstruction of optimized controls
//! - end-state verification of a collocated trajectory

pub mod control;
pub mod error;
pub mod integrator;
pub mod model;
pub mod sim;
pub mod verify;

pub use control::ControlProfile;
pub use error::{SimError, SimResult};
pub use integrator::{DormandPrince45, ForwardEuler, Integrator, RK4, TrialStep};
pub use model::TransientModel;
pub use sim::{IntegratorType, SimOptions, SimRecord, run_sim};
pub use verify::{
    PhaseModel, SimTrajectory, StateDiscrepancy, Verification, VerificationReport,
    VerificationWarning, VerifyOptions, verify,
};
