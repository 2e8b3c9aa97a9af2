//! Contract of the ODE collaborator.
//!
//! The ODE is a pure function of `(time, inputs)`; it is evaluated at
//! arbitrary, possibly non-monotonic node times while derivatives are
//! assembled, so implementations must not keep hidden state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named, optionally unit-annotated ODE input or output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub units: Option<String>,
}

impl Port {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: None,
        }
    }

    pub fn with_units(name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: Some(units.into()),
        }
    }
}

/// Declared inputs and outputs of an ODE, in evaluation order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OdeSignature {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl OdeSignature {
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OdeError {
    #[error("ODE evaluation failed at t={time}: {what}")]
    Evaluation { time: f64, what: String },

    #[error("ODE input length mismatch: expected {expected}, got {actual}")]
    InputShape { expected: usize, actual: usize },
}

pub type OdeResult<T> = Result<T, OdeError>;

/// State-rate collaborator: `(time, inputs) -> outputs`.
///
/// `inputs` follows [`OdeSignature::inputs`], `outputs` follows
/// [`OdeSignature::outputs`]. Rates are ordinary outputs referenced by each
/// state's `rate_source`.
pub trait OdeSystem: Send + Sync {
    fn signature(&self) -> OdeSignature;

    fn evaluate(&self, time: f64, inputs: &[f64], outputs: &mut [f64]) -> OdeResult<()>;
}
