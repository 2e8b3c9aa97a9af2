//! Affine scaling of physical quantities to order-unity NLP values.
//!
//! `scaled = (physical + adder) * scaler`. A reference pair (`ref0`, `ref`)
//! maps `ref0 -> 0` and `ref -> 1`, i.e. `scaler = 1 / (ref - ref0)` and
//! `adder = -ref0`. Direct `scaler`/`adder` values may be given instead, but
//! the two styles cannot be mixed.

use serde::{Deserialize, Serialize};
use traj_core::is_finite_bound;

use crate::error::{PhaseError, PhaseResult};

/// User-facing scaling declaration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSpec {
    pub ref0: Option<f64>,
    #[serde(rename = "ref")]
    pub reference: Option<f64>,
    pub scaler: Option<f64>,
    pub adder: Option<f64>,
}

impl ScaleSpec {
    /// Map `ref0 -> 0` and `reference -> 1`.
    pub fn reference(ref0: f64, reference: f64) -> Self {
        Self {
            ref0: Some(ref0),
            reference: Some(reference),
            ..Self::default()
        }
    }

    /// Map `0 -> 0` and `reference -> 1`.
    pub fn with_ref(reference: f64) -> Self {
        Self {
            reference: Some(reference),
            ..Self::default()
        }
    }

    pub fn with_scaler(scaler: f64) -> Self {
        Self {
            scaler: Some(scaler),
            ..Self::default()
        }
    }

    pub fn is_reference_style(&self) -> bool {
        self.ref0.is_some() || self.reference.is_some()
    }

    /// Resolve into a concrete affine map, rejecting degenerate combinations.
    pub fn resolve(&self, name: &str) -> PhaseResult<Scaling> {
        let invalid = |reason: String| PhaseError::InvalidScale {
            name: name.to_string(),
            reason,
        };

        if self.is_reference_style() {
            if self.scaler.is_some() || self.adder.is_some() {
                return Err(invalid(
                    "ref/ref0 cannot be combined with scaler/adder".to_string(),
                ));
            }
            let ref0 = self.ref0.unwrap_or(0.0);
            let reference = self.reference.unwrap_or(1.0);
            if !ref0.is_finite() || !reference.is_finite() {
                return Err(invalid(format!(
                    "non-finite reference (ref0={ref0}, ref={reference})"
                )));
            }
            if reference == ref0 {
                return Err(invalid(format!(
                    "ref == ref0 == {reference} gives a zero-range scaling"
                )));
            }
            return Ok(Scaling {
                scaler: 1.0 / (reference - ref0),
                adder: -ref0,
            });
        }

        let scaler = self.scaler.unwrap_or(1.0);
        let adder = self.adder.unwrap_or(0.0);
        if !scaler.is_finite() || !adder.is_finite() {
            return Err(invalid(format!(
                "non-finite scaler/adder (scaler={scaler}, adder={adder})"
            )));
        }
        if scaler == 0.0 {
            return Err(invalid("scaler must be non-zero".to_string()));
        }
        Ok(Scaling { scaler, adder })
    }
}

/// Resolved affine map between physical and scaled values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    pub scaler: f64,
    pub adder: f64,
}

impl Default for Scaling {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Scaling {
    pub const IDENTITY: Scaling = Scaling {
        scaler: 1.0,
        adder: 0.0,
    };

    #[inline]
    pub fn scale(&self, physical: f64) -> f64 {
        (physical + self.adder) * self.scaler
    }

    #[inline]
    pub fn unscale(&self, scaled: f64) -> f64 {
        scaled / self.scaler - self.adder
    }

    /// Scale a difference of two physical values (the adder cancels).
    #[inline]
    pub fn scale_delta(&self, delta: f64) -> f64 {
        delta * self.scaler
    }

    /// Scale a `[lower, upper]` pair. Infinite ends stay infinite and the pair
    /// is swapped when the scaler is negative.
    pub fn scale_bounds(&self, lower: f64, upper: f64) -> (f64, f64) {
        let map = |v: f64, sign: f64| {
            if is_finite_bound(v) {
                self.scale(v)
            } else {
                sign * f64::INFINITY
            }
        };
        if self.scaler > 0.0 {
            (map(lower, -1.0), map(upper, 1.0))
        } else {
            (map(upper, -1.0), map(lower, 1.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_pair_maps_to_unit_interval() {
        let s = ScaleSpec::reference(10.0, 100.0).resolve("h").unwrap();
        assert!((s.scale(10.0)).abs() < 1e-15);
        assert!((s.scale(100.0) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn equal_refs_are_degenerate() {
        let err = ScaleSpec::reference(5.0, 5.0).resolve("x").unwrap_err();
        assert!(matches!(err, PhaseError::InvalidScale { .. }));
    }

    #[test]
    fn zero_scaler_is_degenerate() {
        assert!(ScaleSpec::with_scaler(0.0).resolve("x").is_err());
    }

    #[test]
    fn mixing_styles_is_rejected() {
        let spec = ScaleSpec {
            reference: Some(2.0),
            scaler: Some(3.0),
            ..ScaleSpec::default()
        };
        assert!(spec.resolve("x").is_err());
    }

    #[test]
    fn negative_scaler_swaps_bounds() {
        let s = ScaleSpec::with_scaler(-2.0).resolve("x").unwrap();
        let (lo, hi) = s.scale_bounds(1.0, 3.0);
        assert_eq!((lo, hi), (-6.0, -2.0));
    }

    #[test]
    fn infinite_bounds_stay_infinite() {
        let s = ScaleSpec::with_ref(1e3).resolve("r").unwrap();
        let (lo, hi) = s.scale_bounds(-traj_core::INFINITE_BOUND, 5e2);
        assert_eq!(lo, f64::NEG_INFINITY);
        assert!((hi - 0.5).abs() < 1e-15);
    }

    #[test]
    fn deserializes_ref_keyword() {
        let spec: ScaleSpec = serde_json::from_str(r#"{"ref0": 10.0, "ref": 100.0}"#).unwrap();
        assert_eq!(spec, ScaleSpec::reference(10.0, 100.0));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn scale_unscale_round_trip(
            ref0 in -1e4_f64..1e4,
            span in 1e-3_f64..1e4,
            v in -1e5_f64..1e5,
        ) {
            let s = ScaleSpec::reference(ref0, ref0 + span).resolve("p").unwrap();
            let back = s.unscale(s.scale(v));
            prop_assert!((back - v).abs() <= 1e-9 * v.abs().max(1.0) * (1.0 + ref0.abs() / span));
        }
    }
}
