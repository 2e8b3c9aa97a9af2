//! Physical-unit storage of one trajectory iterate.

use serde::{Deserialize, Serialize};

use crate::error::{TranscriptionError, TranscriptionResult};

/// Values of one variable at every input slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: f64,
}

/// Time, state, control and parameter values in physical units.
///
/// State series have one value per state input slot and control series one
/// per control input slot, in the slot order of the transcription that
/// created the buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryBuffer {
    pub t_initial: f64,
    pub t_duration: f64,
    states: Vec<NamedSeries>,
    controls: Vec<NamedSeries>,
    parameters: Vec<NamedValue>,
}

fn find<'a>(series: &'a [NamedSeries], name: &str) -> Option<&'a NamedSeries> {
    series.iter().find(|s| s.name == name)
}

fn set_series(series: &mut [NamedSeries], name: &str, values: Vec<f64>) -> TranscriptionResult<()> {
    let entry = series
        .iter_mut()
        .find(|s| s.name == name)
        .ok_or_else(|| TranscriptionError::UnknownVariable {
            name: name.to_string(),
        })?;
    if entry.values.len() != values.len() {
        return Err(TranscriptionError::GuessShape {
            name: name.to_string(),
            expected: entry.values.len(),
            actual: values.len(),
        });
    }
    entry.values = values;
    Ok(())
}

impl TrajectoryBuffer {
    pub(crate) fn new(
        t_initial: f64,
        t_duration: f64,
        states: Vec<NamedSeries>,
        controls: Vec<NamedSeries>,
        parameters: Vec<NamedValue>,
    ) -> Self {
        Self {
            t_initial,
            t_duration,
            states,
            controls,
            parameters,
        }
    }

    pub fn states(&self) -> &[NamedSeries] {
        &self.states
    }

    pub fn controls(&self) -> &[NamedSeries] {
        &self.controls
    }

    pub fn parameters(&self) -> &[NamedValue] {
        &self.parameters
    }

    pub fn state(&self, name: &str) -> Option<&[f64]> {
        find(&self.states, name).map(|s| s.values.as_slice())
    }

    pub fn control(&self, name: &str) -> Option<&[f64]> {
        find(&self.controls, name).map(|s| s.values.as_slice())
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }

    /// Replace a state's slot values. The length must match the slot count.
    pub fn set_state(&mut self, name: &str, values: Vec<f64>) -> TranscriptionResult<()> {
        set_series(&mut self.states, name, values)
    }

    /// Replace a control's slot values. The length must match the slot count.
    pub fn set_control(&mut self, name: &str, values: Vec<f64>) -> TranscriptionResult<()> {
        set_series(&mut self.controls, name, values)
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) -> TranscriptionResult<()> {
        let entry = self
            .parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| TranscriptionError::UnknownVariable {
                name: name.to_string(),
            })?;
        entry.value = value;
        Ok(())
    }

    pub(crate) fn state_values(&self, index: usize) -> &[f64] {
        &self.states[index].values
    }

    pub(crate) fn state_values_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.states[index].values
    }

    pub(crate) fn control_values(&self, index: usize) -> &[f64] {
        &self.controls[index].values
    }

    pub(crate) fn control_values_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.controls[index].values
    }

    pub(crate) fn parameter_value(&self, index: usize) -> f64 {
        self.parameters[index].value
    }

    pub(crate) fn parameter_value_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.parameters[index].value
    }

    pub fn parameter_values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    /// Check that another buffer has the same variables and series lengths.
    pub fn check_shape(&self, other: &TrajectoryBuffer) -> TranscriptionResult<()> {
        let series_pairs = self
            .states
            .iter()
            .zip(&other.states)
            .chain(self.controls.iter().zip(&other.controls));
        if self.states.len() != other.states.len()
            || self.controls.len() != other.controls.len()
            || self.parameters.len() != other.parameters.len()
        {
            return Err(TranscriptionError::GuessShape {
                name: "buffer".to_string(),
                expected: self.states.len() + self.controls.len() + self.parameters.len(),
                actual: other.states.len() + other.controls.len() + other.parameters.len(),
            });
        }
        for (mine, theirs) in series_pairs {
            if mine.name != theirs.name {
                return Err(TranscriptionError::UnknownVariable {
                    name: theirs.name.clone(),
                });
            }
            if mine.values.len() != theirs.values.len() {
                return Err(TranscriptionError::GuessShape {
                    name: mine.name.clone(),
                    expected: mine.values.len(),
                    actual: theirs.values.len(),
                });
            }
        }
        for (mine, theirs) in self.parameters.iter().zip(&other.parameters) {
            if mine.name != theirs.name {
                return Err(TranscriptionError::UnknownVariable {
                    name: theirs.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// First non-finite value, reported by variable name and slot.
    pub fn check_finite(&self) -> TranscriptionResult<()> {
        let non_finite = |name: &str, index: usize| TranscriptionError::NonFinite {
            name: name.to_string(),
            index,
        };
        if !self.t_initial.is_finite() {
            return Err(non_finite("t_initial", 0));
        }
        if !self.t_duration.is_finite() {
            return Err(non_finite("t_duration", 0));
        }
        for series in self.states.iter().chain(&self.controls) {
            if let Some(i) = series.values.iter().position(|v| !v.is_finite()) {
                return Err(non_finite(&series.name, i));
            }
        }
        if let Some(p) = self.parameters.iter().find(|p| !p.value.is_finite()) {
            return Err(non_finite(&p.name, 0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> TrajectoryBuffer {
        TrajectoryBuffer::new(
            0.0,
            2.0,
            vec![NamedSeries {
                name: "x".into(),
                values: vec![0.0; 3],
            }],
            vec![NamedSeries {
                name: "u".into(),
                values: vec![0.0; 5],
            }],
            vec![NamedValue {
                name: "g".into(),
                value: 9.81,
            }],
        )
    }

    #[test]
    fn wrong_length_guess_is_rejected() {
        let mut buf = buffer();
        let err = buf.set_state("x", vec![1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            TranscriptionError::GuessShape {
                name: "x".into(),
                expected: 3,
                actual: 2
            }
        );
        assert!(buf.set_control("u", vec![1.0; 5]).is_ok());
        assert!(matches!(
            buf.set_control("w", vec![]),
            Err(TranscriptionError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn non_finite_values_are_located() {
        let mut buf = buffer();
        buf.set_state("x", vec![0.0, f64::NAN, 1.0]).unwrap();
        assert_eq!(
            buf.check_finite().unwrap_err(),
            TranscriptionError::NonFinite {
                name: "x".into(),
                index: 1
            }
        );
    }

    #[test]
    fn shape_mismatch_names_the_series() {
        let a = buffer();
        let mut b = buffer();
        b.controls[0].values.push(1.0);
        assert!(matches!(
            a.check_shape(&b),
            Err(TranscriptionError::GuessShape { ref name, .. }) if name == "u"
        ));
        assert!(a.check_shape(&buffer()).is_ok());
    }
}
