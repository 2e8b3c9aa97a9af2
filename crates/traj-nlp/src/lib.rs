//! NLP contracts and the adapter that exposes a transcription to a solver.
//!
//! The constraint Jacobian is structurally sparse: every row depends only on
//! its segment's slots plus time and optimized parameters. Rows that are
//! affine in the design vector carry exact coefficients; the rest are
//! differenced with columns colored so one evaluation recovers a whole color
//! group. The same coloring drives second differences for the Lagrangian
//! Hessian.

pub mod adapter;
pub mod coloring;
pub mod error;
pub mod fd;
pub mod problem;
pub mod sparsity;

pub use adapter::TranscribedNlp;
pub use coloring::Coloring;
pub use error::{NlpError, NlpResult};
pub use fd::{
    ColoringConfig, FdScheme, FiniteDifference, colored_hessian, colored_jacobian, gradient,
    hessian_footprints,
};
pub use problem::{IterationReport, IterationStatus, NlpProblem, NlpSolver, SolverIterate};
pub use sparsity::SparsityPattern;
