//! Per-row constraint table of an iterate.

use std::fmt;

use serde::{Deserialize, Serialize};
use traj_core::is_finite_bound;
use traj_transcription::{ConstraintKind, Transcription};

use crate::solution::Solution;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintStatus {
    Inactive,
    /// Satisfied equality row.
    Equality,
    /// Sitting on the lower bound.
    Lower,
    /// Sitting on the upper bound.
    Upper,
    Violated,
}

impl ConstraintStatus {
    fn code(&self) -> &'static str {
        match self {
            ConstraintStatus::Inactive => "",
            ConstraintStatus::Equality => "=",
            ConstraintStatus::Lower => "l",
            ConstraintStatus::Upper => "u",
            ConstraintStatus::Violated => "v",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDiagnostic {
    pub index: usize,
    pub label: String,
    pub kind: ConstraintKind,
    pub lower: f64,
    pub value: f64,
    pub upper: f64,
    /// Scaled multiplier; positive pushes against the scaled upper bound.
    pub multiplier: f64,
    pub status: ConstraintStatus,
}

impl ConstraintDiagnostic {
    /// Bound-active inequality or violated row.
    pub fn is_notable(&self) -> bool {
        matches!(
            self.status,
            ConstraintStatus::Lower | ConstraintStatus::Upper | ConstraintStatus::Violated
        )
    }
}

impl fmt::Display for ConstraintDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:<32} {:>13.6e} <= {:>13.6e} <= {:>13.6e} {:>2} {:>11.4e}",
            self.index,
            self.label,
            self.lower,
            self.value,
            self.upper,
            self.status.code(),
            self.multiplier
        )
    }
}

/// Classify every row of `solution` against its bounds.
///
/// `tol` is measured in scaled units so rows with very different magnitudes
/// are judged consistently.
pub fn constraint_table(
    transcription: &Transcription,
    solution: &Solution,
    tol: f64,
) -> Vec<ConstraintDiagnostic> {
    transcription
        .rows()
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let value = solution.constraints.get(index).copied().unwrap_or(f64::NAN);
            let gap = |bound: f64| row.scaling.scale_delta(value - bound).abs();
            let below = is_finite_bound(row.lower) && value < row.lower && gap(row.lower) > tol;
            let above = is_finite_bound(row.upper) && value > row.upper && gap(row.upper) > tol;
            let status = if !value.is_finite() || below || above {
                ConstraintStatus::Violated
            } else if row.equality {
                ConstraintStatus::Equality
            } else if is_finite_bound(row.lower) && gap(row.lower) <= tol {
                ConstraintStatus::Lower
            } else if is_finite_bound(row.upper) && gap(row.upper) <= tol {
                ConstraintStatus::Upper
            } else {
                ConstraintStatus::Inactive
            };
            ConstraintDiagnostic {
                index,
                label: row.label.clone(),
                kind: row.kind,
                lower: row.lower,
                value,
                upper: row.upper,
                multiplier: solution.multipliers.get(index).copied().unwrap_or(0.0),
                status,
            }
        })
        .collect()
}
