//! Application layer for trajectory optimization.
//!
//! Builds the `Problem -> Trajectory -> Phase` ownership tree from code or
//! from YAML case files, resolves ODE models by name, and runs the
//! solve-then-simulate workflow shared by the CLI and tests.

pub mod case;
pub mod error;
pub mod models;
pub mod problem;
pub mod run;
pub mod schema;

pub use case::{PHASE_NAME, compile_case, load_case, parse_case, save_case, validate_case};
pub use error::{AppError, AppResult};
pub use models::{
    Brachistochrone, ConstantRate, Decay, DoubleIntegrator, MinEnergyDoubleIntegrator,
    ModelFactory, ModelOptions, ModelRegistry,
};
pub use problem::{PhaseEntry, Problem, Trajectory};
pub use run::{RunOutcome, RunTimingSummary, run_problem};
pub use schema::{CaseFile, InitialGuess, LATEST_VERSION, ModelDef, TranscriptionDef};
