//! Initial guess interpolation onto input slots.

use traj_core::lerp_sorted;

use crate::buffer::TrajectoryBuffer;
use crate::error::{TranscriptionError, TranscriptionResult};
use crate::transcription::Transcription;

impl Transcription {
    fn slot_fractions(&self, name: &str) -> TranscriptionResult<Vec<f64>> {
        if self.phase.state_index(name).is_some() {
            Ok(self.grid.state_slot_fractions())
        } else if self.phase.control_index(name).is_some() {
            Ok(self.grid.control_slot_fractions())
        } else {
            Err(TranscriptionError::UnknownVariable {
                name: name.to_string(),
            })
        }
    }

    /// Linearly interpolate evenly spaced samples over the phase onto the
    /// slots of a state or control.
    ///
    /// Two values are the initial and final value. A single value is held
    /// constant.
    pub fn interp(&self, name: &str, values: &[f64]) -> TranscriptionResult<Vec<f64>> {
        let xs: Vec<f64> = match values.len() {
            0 => {
                return Err(TranscriptionError::GuessShape {
                    name: name.to_string(),
                    expected: 2,
                    actual: 0,
                });
            }
            1 => vec![0.0],
            n => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
        };
        self.interp_at(name, &xs, values)
    }

    /// Interpolate samples at normalized times `xs` (ascending, in `[0, 1]`).
    pub fn interp_at(&self, name: &str, xs: &[f64], ys: &[f64]) -> TranscriptionResult<Vec<f64>> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(TranscriptionError::GuessShape {
                name: name.to_string(),
                expected: xs.len(),
                actual: ys.len(),
            });
        }
        Ok(self
            .slot_fractions(name)?
            .into_iter()
            .map(|f| lerp_sorted(xs, ys, f))
            .collect())
    }

    /// Interpolate and store a guess for a state or control.
    pub fn set_guess(
        &self,
        buffer: &mut TrajectoryBuffer,
        name: &str,
        values: &[f64],
    ) -> TranscriptionResult<()> {
        let slots = self.interp(name, values)?;
        if self.phase.state_index(name).is_some() {
            buffer.set_state(name, slots)
        } else {
            buffer.set_control(name, slots)
        }
    }
}
