//! Declarations of time, states, controls and parameters.
//!
//! Each definition is plain data with chainable setters so phases can be
//! declared in code or deserialized from a case file.

use serde::{Deserialize, Serialize};

use crate::scaling::ScaleSpec;

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

/// Time options for a phase.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeOptions {
    pub units: Option<String>,
    pub fix_initial: bool,
    pub fix_duration: bool,
    pub initial_bounds: (Option<f64>, Option<f64>),
    pub duration_bounds: (Option<f64>, Option<f64>),
    pub initial_scaling: ScaleSpec,
    pub duration_scaling: ScaleSpec,
}

impl TimeOptions {
    pub fn fix_initial(mut self, fix: bool) -> Self {
        self.fix_initial = fix;
        self
    }

    pub fn fix_duration(mut self, fix: bool) -> Self {
        self.fix_duration = fix;
        self
    }

    pub fn initial_bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.initial_bounds = (lower, upper);
        self
    }

    pub fn duration_bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.duration_bounds = (lower, upper);
        self
    }

    pub fn initial_ref(mut self, reference: f64) -> Self {
        self.initial_scaling = ScaleSpec::with_ref(reference);
        self
    }

    pub fn duration_ref(mut self, reference: f64) -> Self {
        self.duration_scaling = ScaleSpec::with_ref(reference);
        self
    }
}

/// A dynamic state integrated by the collocation scheme.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    pub name: String,
    /// Key of the quantity that supplies this state's time derivative.
    pub rate_source: String,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default)]
    pub fix_initial: bool,
    #[serde(default)]
    pub fix_final: bool,
    #[serde(default, flatten)]
    pub scaling: ScaleSpec,
    /// Reference magnitude of the collocation defect. Defaults to the state scale range.
    #[serde(default)]
    pub defect_ref: Option<f64>,
    /// ODE inputs fed by this state. `None` means "the input with the same name, if any".
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

impl StateDef {
    pub fn new(name: impl Into<String>, rate_source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate_source: rate_source.into(),
            units: None,
            lower: None,
            upper: None,
            fix_initial: false,
            fix_final: false,
            scaling: ScaleSpec::default(),
            defect_ref: None,
            targets: None,
        }
    }

    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn lower(mut self, lower: f64) -> Self {
        self.lower = Some(lower);
        self
    }

    pub fn upper(mut self, upper: f64) -> Self {
        self.upper = Some(upper);
        self
    }

    pub fn fix_initial(mut self, fix: bool) -> Self {
        self.fix_initial = fix;
        self
    }

    pub fn fix_final(mut self, fix: bool) -> Self {
        self.fix_final = fix;
        self
    }

    pub fn scaling(mut self, scaling: ScaleSpec) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn reference(mut self, reference: f64) -> Self {
        self.scaling.reference = Some(reference);
        self
    }

    pub fn ref0(mut self, ref0: f64) -> Self {
        self.scaling.ref0 = Some(ref0);
        self
    }

    pub fn defect_ref(mut self, defect_ref: f64) -> Self {
        self.defect_ref = Some(defect_ref);
        self
    }

    pub fn targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = Some(targets.into_iter().map(Into::into).collect());
        self
    }
}

/// A control, discretized at every mesh node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlDef {
    pub name: String,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default, flatten)]
    pub scaling: ScaleSpec,
    #[serde(default = "default_true")]
    pub opt: bool,
    #[serde(default)]
    pub fix_initial: bool,
    #[serde(default)]
    pub fix_final: bool,
    /// Value continuity across segment boundaries (uncompressed transcriptions).
    #[serde(default = "default_true")]
    pub continuity: bool,
    #[serde(default)]
    pub rate_continuity: bool,
    #[serde(default = "default_one")]
    pub rate_continuity_scaler: f64,
    #[serde(default)]
    pub rate2_continuity: bool,
    #[serde(default = "default_one")]
    pub rate2_continuity_scaler: f64,
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

impl ControlDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: None,
            lower: None,
            upper: None,
            scaling: ScaleSpec::default(),
            opt: true,
            fix_initial: false,
            fix_final: false,
            continuity: true,
            rate_continuity: false,
            rate_continuity_scaler: 1.0,
            rate2_continuity: false,
            rate2_continuity_scaler: 1.0,
            targets: None,
        }
    }

    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn scaling(mut self, scaling: ScaleSpec) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn opt(mut self, opt: bool) -> Self {
        self.opt = opt;
        self
    }

    pub fn continuity(mut self, enabled: bool) -> Self {
        self.continuity = enabled;
        self
    }

    pub fn rate_continuity(mut self, enabled: bool, scaler: f64) -> Self {
        self.rate_continuity = enabled;
        self.rate_continuity_scaler = scaler;
        self
    }

    pub fn rate2_continuity(mut self, enabled: bool, scaler: f64) -> Self {
        self.rate2_continuity = enabled;
        self.rate2_continuity_scaler = scaler;
        self
    }

    pub fn targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = Some(targets.into_iter().map(Into::into).collect());
        self
    }
}

/// A scalar parameter, either fixed or optimized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub opt: bool,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default, flatten)]
    pub scaling: ScaleSpec,
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            units: None,
            opt: false,
            lower: None,
            upper: None,
            scaling: ScaleSpec::default(),
            targets: None,
        }
    }

    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn opt(mut self, opt: bool) -> Self {
        self.opt = opt;
        self
    }

    pub fn bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn scaling(mut self, scaling: ScaleSpec) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = Some(targets.into_iter().map(Into::into).collect());
        self
    }
}
