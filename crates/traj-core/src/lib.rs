//! traj-core: stable foundation for the trajectory transcription engine.
//!
//! Contains:
//! - numeric (Real, bound conventions, interpolation)
//! - units (uom-backed conversion factors for declared unit strings)
//! - timing (wall-clock budgets for long-running solves)
//! - error (shared error types)

pub mod error;
pub mod numeric;
pub mod timing;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use numeric::*;
pub use timing::{Deadline, Timer};
pub use units::{Dimension, UnitSpec, conversion_factor, parse_unit};
