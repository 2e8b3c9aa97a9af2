//! Gauss-Lobatto transcription of trajectory phases.
//!
//! [`GaussLobatto::build`] consumes a validated [`traj_phase::Phase`] and
//! produces a [`Transcription`]: the node grid, the scaled design-vector
//! layout, and an ordered list of labelled constraint rows. A
//! [`TrajectoryBuffer`] holds one iterate in physical units; the
//! transcription packs it into (and unpacks it from) the scaled design vector
//! seen by the NLP solver.

pub mod assembler;
pub mod buffer;
pub mod error;
pub mod evaluate;
pub mod guess;
pub mod layout;
pub mod lgl;
pub mod mesh;
pub mod transcription;

pub use assembler::{ConstraintKind, ConstraintRow};
pub use buffer::{NamedSeries, NamedValue, TrajectoryBuffer};
pub use error::{TranscriptionError, TranscriptionResult};
pub use evaluate::{NodeValues, Timeseries};
pub use layout::{DesignLayout, Grid, NodeRef, SegmentGrid};
pub use mesh::Mesh;
pub use transcription::{GaussLobatto, Transcription};
