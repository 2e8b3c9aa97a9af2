//! Boundary constraints, path constraints and the objective.

use serde::{Deserialize, Serialize};

use crate::error::{PhaseError, PhaseResult};
use crate::scaling::ScaleSpec;

/// Where in the phase a boundary quantity is sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Initial,
    Final,
}

impl Location {
    pub fn as_str(self) -> &'static str {
        match self {
            Location::Initial => "initial",
            Location::Final => "final",
        }
    }
}

/// Normalized bounds of a constraint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstraintBounds {
    Equals(f64),
    Interval {
        lower: Option<f64>,
        upper: Option<f64>,
    },
}

impl ConstraintBounds {
    fn from_fields(
        target: &str,
        equals: Option<f64>,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> PhaseResult<Self> {
        let invalid = |reason: &str| PhaseError::InvalidConstraint {
            target: target.to_string(),
            reason: reason.to_string(),
        };
        match (equals, lower, upper) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                Err(invalid("'equals' cannot be combined with 'lower'/'upper'"))
            }
            (Some(v), None, None) if !v.is_finite() => Err(invalid("'equals' must be finite")),
            (Some(v), None, None) => Ok(ConstraintBounds::Equals(v)),
            (None, None, None) => Err(invalid("one of 'equals', 'lower' or 'upper' is required")),
            (None, lower, upper) => {
                if let (Some(lo), Some(hi)) = (lower, upper) {
                    if lo > hi {
                        return Err(PhaseError::InvalidBounds {
                            name: target.to_string(),
                            lower: lo,
                            upper: hi,
                        });
                    }
                }
                Ok(ConstraintBounds::Interval { lower, upper })
            }
        }
    }

    /// `(lower, upper)` with `equals` collapsed to `lower == upper`.
    pub fn as_pair(&self) -> (Option<f64>, Option<f64>) {
        match *self {
            ConstraintBounds::Equals(v) => (Some(v), Some(v)),
            ConstraintBounds::Interval { lower, upper } => (lower, upper),
        }
    }

    pub fn is_equality(&self) -> bool {
        match *self {
            ConstraintBounds::Equals(_) => true,
            ConstraintBounds::Interval { lower, upper } => lower.is_some() && lower == upper,
        }
    }
}

/// Bound or equality enforced at the initial or final node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConstraint {
    pub target: String,
    pub loc: Location,
    #[serde(default)]
    pub equals: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default, flatten)]
    pub scaling: ScaleSpec,
}

impl BoundaryConstraint {
    pub fn equals(target: impl Into<String>, loc: Location, value: f64) -> Self {
        Self {
            target: target.into(),
            loc,
            equals: Some(value),
            lower: None,
            upper: None,
            scaling: ScaleSpec::default(),
        }
    }

    pub fn interval(
        target: impl Into<String>,
        loc: Location,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Self {
        Self {
            target: target.into(),
            loc,
            equals: None,
            lower,
            upper,
            scaling: ScaleSpec::default(),
        }
    }

    pub fn scaling(mut self, scaling: ScaleSpec) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn bounds(&self) -> PhaseResult<ConstraintBounds> {
        ConstraintBounds::from_fields(&self.target, self.equals, self.lower, self.upper)
    }

    pub fn label(&self) -> String {
        format!("{}_boundary:{}", self.loc.as_str(), self.target)
    }
}

/// Bound enforced at every node of the phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathConstraint {
    pub target: String,
    #[serde(default)]
    pub equals: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default, flatten)]
    pub scaling: ScaleSpec,
}

impl PathConstraint {
    pub fn interval(target: impl Into<String>, lower: Option<f64>, upper: Option<f64>) -> Self {
        Self {
            target: target.into(),
            equals: None,
            lower,
            upper,
            scaling: ScaleSpec::default(),
        }
    }

    pub fn equals(target: impl Into<String>, value: f64) -> Self {
        Self {
            target: target.into(),
            equals: Some(value),
            lower: None,
            upper: None,
            scaling: ScaleSpec::default(),
        }
    }

    pub fn scaling(mut self, scaling: ScaleSpec) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn bounds(&self) -> PhaseResult<ConstraintBounds> {
        ConstraintBounds::from_fields(&self.target, self.equals, self.lower, self.upper)
    }

    pub fn label(&self) -> String {
        format!("path:{}", self.target)
    }
}

/// Quantity minimized by the NLP. A negative `ref`/`scaler` maximizes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub target: String,
    pub loc: Location,
    #[serde(default, flatten)]
    pub scaling: ScaleSpec,
}

impl Objective {
    pub fn new(target: impl Into<String>, loc: Location) -> Self {
        Self {
            target: target.into(),
            loc,
            scaling: ScaleSpec::default(),
        }
    }

    pub fn scaling(mut self, scaling: ScaleSpec) -> Self {
        self.scaling = scaling;
        self
    }
}
