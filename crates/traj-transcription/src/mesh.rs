//! Segment layout of a phase on the normalized time interval `[0, 1]`.

use crate::error::{TranscriptionError, TranscriptionResult};

/// Ordered segments with their collocation order and relative duration.
///
/// A segment of order `k` carries `2k + 1` LGL nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    orders: Vec<usize>,
    /// Cumulative segment boundaries, `ends[0] = 0` and `ends[n] = 1`.
    ends: Vec<f64>,
}

impl Mesh {
    /// `num_segments` equal segments of the same order.
    pub fn uniform(num_segments: usize, order: usize) -> TranscriptionResult<Self> {
        Self::new(vec![1.0; num_segments], vec![order; num_segments])
    }

    /// Segments with relative durations `fractions` (normalized to sum to one).
    pub fn new(fractions: Vec<f64>, orders: Vec<usize>) -> TranscriptionResult<Self> {
        let invalid = |reason: String| TranscriptionError::InvalidMesh { reason };
        if fractions.is_empty() {
            return Err(invalid("mesh needs at least one segment".into()));
        }
        if fractions.len() != orders.len() {
            return Err(invalid(format!(
                "{} segment fractions but {} orders",
                fractions.len(),
                orders.len()
            )));
        }
        if let Some(s) = orders.iter().position(|&k| k == 0) {
            return Err(invalid(format!("segment {s} has order 0")));
        }
        if let Some(s) = fractions.iter().position(|f| !f.is_finite() || *f <= 0.0) {
            return Err(invalid(format!(
                "segment {s} has non-positive fraction {}",
                fractions[s]
            )));
        }

        let total: f64 = fractions.iter().sum();
        let mut ends = Vec::with_capacity(fractions.len() + 1);
        let mut acc = 0.0;
        ends.push(0.0);
        for f in &fractions[..fractions.len() - 1] {
            acc += f / total;
            ends.push(acc);
        }
        ends.push(1.0);
        Ok(Self { orders, ends })
    }

    /// Build from explicit segment boundaries in `[-1, 1]` (or any increasing
    /// sequence), the way segment ends are usually written in case files.
    pub fn from_segment_ends(ends: &[f64], orders: Vec<usize>) -> TranscriptionResult<Self> {
        if ends.len() < 2 {
            return Err(TranscriptionError::InvalidMesh {
                reason: "segment ends need at least two entries".into(),
            });
        }
        let fractions = ends.windows(2).map(|w| w[1] - w[0]).collect();
        Self::new(fractions, orders)
    }

    pub fn num_segments(&self) -> usize {
        self.orders.len()
    }

    pub fn order(&self, segment: usize) -> usize {
        self.orders[segment]
    }

    pub fn orders(&self) -> &[usize] {
        &self.orders
    }

    /// Normalized `(start, end)` of a segment.
    pub fn span(&self, segment: usize) -> (f64, f64) {
        (self.ends[segment], self.ends[segment + 1])
    }

    /// Normalized duration of a segment.
    pub fn fraction(&self, segment: usize) -> f64 {
        self.ends[segment + 1] - self.ends[segment]
    }

    /// Total number of LGL nodes when segment boundaries are counted twice.
    pub fn num_nodes(&self) -> usize {
        self.orders.iter().map(|k| 2 * k + 1).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_mesh_splits_evenly() {
        let mesh = Mesh::uniform(4, 1).unwrap();
        assert_eq!(mesh.num_segments(), 4);
        assert!((mesh.fraction(2) - 0.25).abs() < 1e-15);
        assert_eq!(mesh.span(3).1, 1.0);
        assert_eq!(mesh.num_nodes(), 12);
    }

    #[test]
    fn fractions_are_normalized() {
        let mesh = Mesh::new(vec![1.0, 3.0], vec![1, 2]).unwrap();
        assert!((mesh.span(0).1 - 0.25).abs() < 1e-15);
        assert_eq!(mesh.num_nodes(), 3 + 5);
    }

    #[test]
    fn segment_ends_give_fractions() {
        let mesh = Mesh::from_segment_ends(&[-1.0, 0.0, 1.0], vec![1, 1]).unwrap();
        assert!((mesh.fraction(0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn degenerate_meshes_are_rejected() {
        assert!(matches!(
            Mesh::uniform(0, 1),
            Err(TranscriptionError::InvalidMesh { .. })
        ));
        assert!(Mesh::uniform(3, 0).is_err());
        assert!(Mesh::new(vec![1.0, 0.0], vec![1, 1]).is_err());
        assert!(Mesh::new(vec![1.0, f64::NAN], vec![1, 1]).is_err());
        assert!(Mesh::new(vec![1.0], vec![1, 1]).is_err());
        assert!(Mesh::from_segment_ends(&[0.0, 0.5, 0.5], vec![1, 1]).is_err());
    }
}
