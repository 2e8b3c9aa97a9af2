//! Solve driver: owns one NLP solve from guess to solution snapshot.

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod solution;

pub use config::DriverConfig;
pub use diagnostics::{ConstraintDiagnostic, ConstraintStatus, constraint_table};
pub use driver::{DriverState, SolveDriver, SolveReport};
pub use error::{DriverError, DriverResult, SolverFailure};
pub use solution::Solution;
