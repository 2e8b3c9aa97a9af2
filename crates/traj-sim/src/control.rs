//! Continuous control history rebuilt from optimized node values.

use traj_transcription::lgl::lagrange_eval;
use traj_transcription::{Transcription, TrajectoryBuffer};

#[derive(Clone, Debug)]
struct SegmentBasis {
    span: (f64, f64),
    tau: Vec<f64>,
    weights: Vec<f64>,
}

/// Per-segment Lagrange interpolant of every control.
///
/// Times outside the phase are clamped to its ends.
#[derive(Clone, Debug)]
pub struct ControlProfile {
    t_initial: f64,
    t_duration: f64,
    segments: Vec<SegmentBasis>,
    /// `values[control][segment]` holds the segment's node values.
    values: Vec<Vec<Vec<f64>>>,
}

impl ControlProfile {
    pub fn new(transcription: &Transcription, buffer: &TrajectoryBuffer) -> Self {
        let grid = transcription.grid();
        let segments = grid
            .segments
            .iter()
            .map(|seg| SegmentBasis {
                span: seg.span,
                tau: seg.tau.clone(),
                weights: seg.lagrange_weights.clone(),
            })
            .collect();
        let values = (0..transcription.phase().controls().len())
            .map(|c| {
                (0..grid.segments.len())
                    .map(|s| transcription.segment_control_values(buffer, c, s))
                    .collect()
            })
            .collect();
        Self {
            t_initial: buffer.t_initial,
            t_duration: buffer.t_duration,
            segments,
            values,
        }
    }

    /// Segment index and local `tau` of a phase time.
    fn locate(&self, t: f64) -> (usize, f64) {
        let fraction = if self.t_duration > 0.0 {
            ((t - self.t_initial) / self.t_duration).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let last = self.segments.len().saturating_sub(1);
        let segment = self
            .segments
            .partition_point(|seg| seg.span.1 < fraction)
            .min(last);
        let (a, b) = self.segments[segment].span;
        let tau = if b > a {
            (2.0 * (fraction - a) / (b - a) - 1.0).clamp(-1.0, 1.0)
        } else {
            -1.0
        };
        (segment, tau)
    }

    pub fn value(&self, control: usize, t: f64) -> f64 {
        let (segment, tau) = self.locate(t);
        let basis = &self.segments[segment];
        lagrange_eval(
            &basis.tau,
            &basis.weights,
            &self.values[control][segment],
            tau,
        )
    }

    /// Every control at `t`.
    pub fn values_at(&self, t: f64, out: &mut [f64]) {
        if self.values.is_empty() {
            return;
        }
        let (segment, tau) = self.locate(t);
        let basis = &self.segments[segment];
        for (slot, per_segment) in out.iter_mut().zip(&self.values) {
            *slot = lagrange_eval(&basis.tau, &basis.weights, &per_segment[segment], tau);
        }
    }
}
