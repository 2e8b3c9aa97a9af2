//! Phase schema for collocation trajectory optimization.
//!
//! A [`Phase`] collects the declarations of one continuous segment of a
//! trajectory: time options, states, controls, parameters, boundary and path
//! constraints, and the objective, together with the ODE collaborator that
//! supplies state rates. [`Phase::bind`] validates the whole schema and
//! resolves every string key into a stable [`Target`].

pub mod constraints;
pub mod error;
pub mod ode;
pub mod phase;
pub mod scaling;
pub mod targets;
pub mod variables;

pub use constraints::{BoundaryConstraint, ConstraintBounds, Location, Objective, PathConstraint};
pub use error::{PhaseError, PhaseResult};
pub use ode::{OdeError, OdeResult, OdeSignature, OdeSystem, Port};
pub use phase::{InputBinding, InputSource, Phase, PhaseBindings, ResolvedConstraint, ResolvedObjective};
pub use scaling::{ScaleSpec, Scaling};
pub use targets::Target;
pub use variables::{ControlDef, ParameterDef, StateDef, TimeOptions};
