//! [`NlpProblem`] view of a Gauss-Lobatto transcription.

use tracing::debug;
use traj_transcription::{Transcription, TrajectoryBuffer};

use crate::coloring::Coloring;
use crate::error::{NlpError, NlpResult};
use crate::fd::{self, ColoringConfig, FdScheme, FiniteDifference};
use crate::problem::NlpProblem;
use crate::sparsity::SparsityPattern;

/// Rows whose derivatives are differenced: the nonlinear constraint rows,
/// followed by the objective when it is not affine.
struct Differenced {
    rows: Vec<usize>,
    objective: bool,
    pattern: SparsityPattern,
    /// Full Jacobian entry of every constraint entry of `pattern`.
    entries: Vec<usize>,
}

/// Exposes a transcription to an NLP solver.
///
/// Fixed values (fixed time, fixed endpoint states, non-optimized controls
/// and parameters) come from `template`; every evaluation unpacks the design
/// vector over a copy of it.
pub struct TranscribedNlp<'a> {
    transcription: &'a Transcription,
    template: TrajectoryBuffer,
    x0: Vec<f64>,
    pattern: SparsityPattern,
    /// Constant Jacobian values of the affine rows, zero elsewhere.
    linear_values: Vec<f64>,
    differenced: Differenced,
    coloring: Coloring,
    hessian: SparsityPattern,
    fd: FiniteDifference,
    parallel: bool,
}

impl<'a> TranscribedNlp<'a> {
    pub fn new(
        transcription: &'a Transcription,
        guess: TrajectoryBuffer,
        config: ColoringConfig,
        fd: FiniteDifference,
    ) -> NlpResult<Self> {
        transcription.check_buffer(&guess)?;
        let n = transcription.num_variables();
        let rows = transcription.rows();
        let footprints: Vec<Vec<usize>> = rows.iter().map(|r| r.columns.clone()).collect();
        let pattern = SparsityPattern::from_rows(n, &footprints)?;

        let mut linear_values = vec![0.0; pattern.nnz()];
        for (r, row) in rows.iter().enumerate() {
            for &(col, coeff) in row.linear.iter().flatten() {
                if let Some(entry) = pattern.entry(r, col) {
                    linear_values[entry] = coeff;
                }
            }
        }

        let nonlinear: Vec<usize> = (0..rows.len()).filter(|&r| !rows[r].is_linear()).collect();
        let objective = transcription.objective_linear().is_none();
        let mut sub: Vec<Vec<usize>> = nonlinear.iter().map(|&r| footprints[r].clone()).collect();
        if objective {
            let mut cols = transcription.objective_columns().to_vec();
            cols.sort_unstable();
            cols.dedup();
            sub.push(cols);
        }
        let sub_pattern = SparsityPattern::from_rows(n, &sub)?;
        let entries = nonlinear
            .iter()
            .flat_map(|&r| {
                let start = pattern.row_offset(r);
                start..start + footprints[r].len()
            })
            .collect();

        let coloring = if config.enabled {
            Coloring::largest_first(&sub_pattern)
        } else {
            Coloring::trivial(n)
        };
        let hessian = SparsityPattern::from_rows(n, &fd::hessian_footprints(&sub_pattern))?;

        let x0 = transcription.pack(&guess);
        if let Some(index) = x0.iter().position(|v| !v.is_finite()) {
            return Err(NlpError::NonFinite {
                what: "initial point",
                index,
            });
        }
        debug!(
            variables = n,
            constraints = pattern.nrows(),
            nnz = pattern.nnz(),
            linear_rows = rows.len() - nonlinear.len(),
            colors = coloring.num_colors(),
            hessian_nnz = hessian.nnz(),
            parallel = config.parallel,
            "nlp adapter ready"
        );
        Ok(Self {
            transcription,
            template: guess,
            x0,
            pattern,
            linear_values,
            differenced: Differenced {
                rows: nonlinear,
                objective,
                pattern: sub_pattern,
                entries,
            },
            coloring,
            hessian,
            fd,
            parallel: config.parallel,
        })
    }

    pub fn transcription(&self) -> &'a Transcription {
        self.transcription
    }

    /// Coloring of the differenced rows.
    pub fn coloring(&self) -> &Coloring {
        &self.coloring
    }

    /// Constraint rows whose Jacobian entries are constant.
    pub fn num_linear_rows(&self) -> usize {
        self.num_constraints() - self.differenced.rows.len()
    }

    /// Physical buffer of a design vector.
    pub fn buffer_at(&self, x: &[f64]) -> NlpResult<TrajectoryBuffer> {
        let mut buffer = self.template.clone();
        self.transcription.unpack(x, &mut buffer)?;
        Ok(buffer)
    }

    fn check_len(&self, x: &[f64]) -> NlpResult<()> {
        if x.len() != self.num_variables() {
            return Err(NlpError::Dimension {
                what: "design vector",
                expected: self.num_variables(),
                actual: x.len(),
            });
        }
        Ok(())
    }

    fn differenced_values(&self, x: &[f64]) -> NlpResult<Vec<f64>> {
        let (f, g) = self.evaluate(x)?;
        let mut out: Vec<f64> = self.differenced.rows.iter().map(|&r| g[r]).collect();
        if self.differenced.objective {
            out.push(f);
        }
        Ok(out)
    }
}

impl NlpProblem for TranscribedNlp<'_> {
    fn num_variables(&self) -> usize {
        self.transcription.num_variables()
    }

    fn num_constraints(&self) -> usize {
        self.transcription.num_constraints()
    }

    fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.transcription.variable_bounds()
    }

    fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        self.transcription.constraint_bounds()
    }

    fn initial_point(&self) -> Vec<f64> {
        self.x0.clone()
    }

    fn objective(&self, x: &[f64]) -> NlpResult<f64> {
        Ok(self.evaluate(x)?.0)
    }

    fn objective_gradient(&self, x: &[f64]) -> NlpResult<Vec<f64>> {
        self.check_len(x)?;
        if let Some(terms) = self.transcription.objective_linear() {
            let mut grad = vec![0.0; x.len()];
            for &(col, coeff) in terms {
                grad[col] += coeff;
            }
            return Ok(grad);
        }
        let f0 = match self.fd.scheme {
            FdScheme::Forward => self.objective(x)?,
            FdScheme::Central => f64::NAN,
        };
        fd::gradient(
            &|x: &[f64]| self.objective(x),
            x,
            f0,
            self.transcription.objective_columns(),
            self.fd,
        )
    }

    fn constraints(&self, x: &[f64]) -> NlpResult<Vec<f64>> {
        Ok(self.evaluate(x)?.1)
    }

    fn jacobian_sparsity(&self) -> &SparsityPattern {
        &self.pattern
    }

    fn jacobian_values(&self, x: &[f64]) -> NlpResult<Vec<f64>> {
        self.check_len(x)?;
        let mut values = self.linear_values.clone();
        let d = &self.differenced;
        if d.rows.is_empty() {
            return Ok(values);
        }
        let f = |x: &[f64]| self.differenced_values(x);
        let f0 = match self.fd.scheme {
            FdScheme::Forward => f(x)?,
            FdScheme::Central => Vec::new(),
        };
        let sub = fd::colored_jacobian(
            &f,
            x,
            &f0,
            &d.pattern,
            &self.coloring,
            self.fd,
            self.parallel,
        )?;
        // The objective row, when present, is last and has no full entry.
        for (&entry, v) in d.entries.iter().zip(sub) {
            values[entry] = v;
        }
        Ok(values)
    }

    fn hessian_sparsity(&self) -> Option<&SparsityPattern> {
        Some(&self.hessian)
    }

    fn hessian_values(&self, x: &[f64], obj_factor: f64, lambda: &[f64]) -> NlpResult<Vec<f64>> {
        self.check_len(x)?;
        if lambda.len() != self.num_constraints() {
            return Err(NlpError::Dimension {
                what: "constraint multipliers",
                expected: self.num_constraints(),
                actual: lambda.len(),
            });
        }
        let d = &self.differenced;
        let mut weights: Vec<f64> = d.rows.iter().map(|&r| lambda[r]).collect();
        if d.objective {
            weights.push(obj_factor);
        }
        fd::colored_hessian(
            &|x: &[f64]| self.differenced_values(x),
            x,
            &weights,
            &d.pattern,
            &self.coloring,
            &self.hessian,
            self.fd,
            self.parallel,
        )
    }

    fn evaluate(&self, x: &[f64]) -> NlpResult<(f64, Vec<f64>)> {
        self.check_len(x)?;
        let mut scratch = self.template.clone();
        Ok(self.transcription.evaluate_design(x, &mut scratch)?)
    }
}
