//! Colored finite-difference derivatives.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::coloring::Coloring;
use crate::error::NlpResult;
use crate::sparsity::SparsityPattern;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FdScheme {
    Forward,
    Central,
}

/// Finite-difference settings. The step for column `j` is
/// `rel_step * max(1, |x_j|)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiniteDifference {
    pub scheme: FdScheme,
    pub rel_step: f64,
    /// Relative step of the second differences behind the Lagrangian Hessian.
    pub hessian_rel_step: f64,
}

impl Default for FiniteDifference {
    fn default() -> Self {
        Self {
            scheme: FdScheme::Central,
            rel_step: 1e-6,
            hessian_rel_step: 1e-4,
        }
    }
}

impl FiniteDifference {
    fn step(&self, xj: f64) -> f64 {
        self.rel_step * xj.abs().max(1.0)
    }

    fn hessian_step(&self, xj: f64) -> f64 {
        self.hessian_rel_step * xj.abs().max(1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColoringConfig {
    /// Group structurally orthogonal columns. Off means one column per evaluation.
    pub enabled: bool,
    /// Evaluate color groups on the rayon pool.
    pub parallel: bool,
}

impl Default for ColoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parallel: false,
        }
    }
}

/// Directional differences of `f` along one color group.
fn group_difference<F>(
    f: &F,
    x: &[f64],
    f0: &[f64],
    group: &[usize],
    fd: FiniteDifference,
) -> NlpResult<(Vec<f64>, Vec<f64>)>
where
    F: Fn(&[f64]) -> NlpResult<Vec<f64>> + Sync,
{
    let steps: Vec<f64> = group.iter().map(|&j| fd.step(x[j])).collect();
    let mut xp = x.to_vec();
    for (&j, &h) in group.iter().zip(&steps) {
        xp[j] += h;
    }
    let fp = f(&xp)?;
    let diff = match fd.scheme {
        FdScheme::Forward => fp.iter().zip(f0).map(|(a, b)| a - b).collect(),
        FdScheme::Central => {
            let mut xm = x.to_vec();
            for (&j, &h) in group.iter().zip(&steps) {
                xm[j] -= h;
            }
            let fm = f(&xm)?;
            fp.iter().zip(&fm).map(|(a, b)| 0.5 * (a - b)).collect()
        }
    };
    Ok((diff, steps))
}

/// Sparse Jacobian values (pattern order) of `f` at `x`.
///
/// `f0 = f(x)` is only used by forward differences.
pub fn colored_jacobian<F>(
    f: &F,
    x: &[f64],
    f0: &[f64],
    pattern: &SparsityPattern,
    coloring: &Coloring,
    fd: FiniteDifference,
    parallel: bool,
) -> NlpResult<Vec<f64>>
where
    F: Fn(&[f64]) -> NlpResult<Vec<f64>> + Sync,
{
    let diffs: Vec<(Vec<f64>, Vec<f64>)> = if parallel {
        coloring
            .groups
            .par_iter()
            .map(|g| group_difference(f, x, f0, g, fd))
            .collect::<NlpResult<_>>()?
    } else {
        coloring
            .groups
            .iter()
            .map(|g| group_difference(f, x, f0, g, fd))
            .collect::<NlpResult<_>>()?
    };

    let mut values = vec![0.0; pattern.nnz()];
    for (group, (diff, steps)) in coloring.groups.iter().zip(&diffs) {
        for (&col, &h) in group.iter().zip(steps) {
            for &(row, entry) in pattern.column_entries(col) {
                values[entry] = diff[row] / h;
            }
        }
    }
    Ok(values)
}

/// Four-point mixed difference along color groups `a` and `b`.
///
/// For `a == b` the two middle points collapse onto `x` and the result is the
/// plain second difference with step `2h`.
fn pair_difference<F>(
    f: &F,
    x: &[f64],
    steps: &[f64],
    a: &[usize],
    b: &[usize],
) -> NlpResult<Vec<f64>>
where
    F: Fn(&[f64]) -> NlpResult<Vec<f64>> + Sync,
{
    let shifted = |sa: f64, sb: f64| {
        let mut xs = x.to_vec();
        for &j in a {
            xs[j] += sa * steps[j];
        }
        for &k in b {
            xs[k] += sb * steps[k];
        }
        f(&xs)
    };
    let pp = shifted(1.0, 1.0)?;
    let pm = shifted(1.0, -1.0)?;
    let mp = shifted(-1.0, 1.0)?;
    let mm = shifted(-1.0, -1.0)?;
    Ok((0..pp.len())
        .map(|r| pp[r] - pm[r] - mp[r] + mm[r])
        .collect())
}

/// Lower-triangle Hessian of `sum_r weights[r] * f_r(x)` by colored second
/// differences.
///
/// `pattern` is the row structure of `f` and `coloring` must be valid for it:
/// each row then sees at most one perturbed column per color, so one
/// four-point difference along colors `(a, b)` yields `d2 f_r / dx_j dx_k`
/// for the row's columns `j` of color `a` and `k` of color `b`. `hessian`
/// holds the lower triangle (`col <= row`) and must cover every column pair
/// sharing a row of `pattern`.
#[allow(clippy::too_many_arguments)]
pub fn colored_hessian<F>(
    f: &F,
    x: &[f64],
    weights: &[f64],
    pattern: &SparsityPattern,
    coloring: &Coloring,
    hessian: &SparsityPattern,
    fd: FiniteDifference,
    parallel: bool,
) -> NlpResult<Vec<f64>>
where
    F: Fn(&[f64]) -> NlpResult<Vec<f64>> + Sync,
{
    let steps: Vec<f64> = x.iter().map(|&v| fd.hessian_step(v)).collect();
    let color_pair = |j: usize, k: usize| {
        let (a, b) = (coloring.colors[j], coloring.colors[k]);
        (a.min(b), a.max(b))
    };

    let mut needed = BTreeSet::new();
    for row in (0..pattern.nrows()).filter(|&r| weights[r] != 0.0) {
        let cols = pattern.row_columns(row);
        for (p, &j) in cols.iter().enumerate() {
            for &k in &cols[..=p] {
                needed.insert(color_pair(j, k));
            }
        }
    }
    let pairs: Vec<(usize, usize)> = needed.into_iter().collect();
    let difference = |&(a, b): &(usize, usize)| {
        pair_difference(f, x, &steps, &coloring.groups[a], &coloring.groups[b])
    };
    let diffs: Vec<Vec<f64>> = if parallel {
        pairs.par_iter().map(difference).collect::<NlpResult<_>>()?
    } else {
        pairs.iter().map(difference).collect::<NlpResult<_>>()?
    };
    let index: BTreeMap<(usize, usize), usize> =
        pairs.iter().enumerate().map(|(i, &pair)| (pair, i)).collect();

    let mut values = vec![0.0; hessian.nnz()];
    for row in (0..pattern.nrows()).filter(|&r| weights[r] != 0.0) {
        let cols = pattern.row_columns(row);
        for (p, &j) in cols.iter().enumerate() {
            for &k in &cols[..=p] {
                let (Some(&i), Some(entry)) = (index.get(&color_pair(j, k)), hessian.entry(j, k))
                else {
                    continue;
                };
                values[entry] += weights[row] * diffs[i][row] / (4.0 * steps[j] * steps[k]);
            }
        }
    }
    Ok(values)
}

/// Lower-triangle footprints (`col <= row`) of every column pair that shares
/// a row of `pattern`.
pub fn hessian_footprints(pattern: &SparsityPattern) -> Vec<Vec<usize>> {
    let mut sets = vec![BTreeSet::new(); pattern.ncols()];
    for row in 0..pattern.nrows() {
        let cols = pattern.row_columns(row);
        for (p, &j) in cols.iter().enumerate() {
            for &k in &cols[..=p] {
                sets[j.max(k)].insert(j.min(k));
            }
        }
    }
    sets.into_iter().map(|s| s.into_iter().collect()).collect()
}

/// Dense gradient of a scalar function, differenced only along `columns`.
pub fn gradient<F>(
    f: &F,
    x: &[f64],
    f0: f64,
    columns: &[usize],
    fd: FiniteDifference,
) -> NlpResult<Vec<f64>>
where
    F: Fn(&[f64]) -> NlpResult<f64>,
{
    let mut grad = vec![0.0; x.len()];
    let mut xp = x.to_vec();
    for &j in columns {
        let h = fd.step(x[j]);
        xp[j] = x[j] + h;
        let fp = f(&xp)?;
        grad[j] = match fd.scheme {
            FdScheme::Forward => (fp - f0) / h,
            FdScheme::Central => {
                xp[j] = x[j] - h;
                let fm = f(&xp)?;
                0.5 * (fp - fm) / h
            }
        };
        xp[j] = x[j];
    }
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residual(x: &[f64]) -> NlpResult<Vec<f64>> {
        Ok(vec![
            x[0] * x[0] - x[1],
            x[1].sin() + 2.0 * x[2],
            x[2] * x[3],
            x[3].exp(),
        ])
    }

    fn pattern() -> SparsityPattern {
        SparsityPattern::from_rows(4, &[vec![0, 1], vec![1, 2], vec![2, 3], vec![3]]).unwrap()
    }

    fn exact(x: &[f64]) -> Vec<f64> {
        vec![
            2.0 * x[0],
            -1.0,
            x[1].cos(),
            2.0,
            x[3],
            x[2],
            x[3].exp(),
        ]
    }

    #[test]
    fn colored_central_matches_analytic() {
        let x = [0.7, -0.3, 1.2, 0.4];
        let p = pattern();
        let coloring = Coloring::largest_first(&p);
        assert!(coloring.num_colors() < 4);
        let f0 = residual(&x).unwrap();
        for parallel in [false, true] {
            let values = colored_jacobian(
                &residual,
                &x,
                &f0,
                &p,
                &coloring,
                FiniteDifference::default(),
                parallel,
            )
            .unwrap();
            for (v, e) in values.iter().zip(exact(&x)) {
                assert!((v - e).abs() < 1e-8, "{v} vs {e}");
            }
        }
    }

    #[test]
    fn forward_differences_are_first_order_accurate() {
        let x = [0.7, -0.3, 1.2, 0.4];
        let p = pattern();
        let fd = FiniteDifference {
            scheme: FdScheme::Forward,
            rel_step: 1e-7,
            ..FiniteDifference::default()
        };
        let f0 = residual(&x).unwrap();
        let values =
            colored_jacobian(&residual, &x, &f0, &p, &Coloring::trivial(4), fd, false).unwrap();
        for (v, e) in values.iter().zip(exact(&x)) {
            assert!((v - e).abs() < 1e-5);
        }
    }

    #[test]
    fn colored_hessian_matches_analytic_second_derivatives() {
        let x: [f64; 4] = [0.7, -0.3, 1.2, 0.4];
        let w = [0.5, -2.0, 1.5, 3.0];
        let p = pattern();
        let h = SparsityPattern::from_rows(4, &hessian_footprints(&p)).unwrap();
        // Lower triangle: (0,0) (1,0) (1,1) (2,1) (2,2) (3,2) (3,3).
        assert_eq!(h.nnz(), 7);
        let mut exact = vec![0.0; h.nnz()];
        exact[h.entry(0, 0).unwrap()] = w[0] * 2.0;
        exact[h.entry(1, 1).unwrap()] = -w[1] * x[1].sin();
        exact[h.entry(3, 2).unwrap()] = w[2];
        exact[h.entry(3, 3).unwrap()] = w[3] * x[3].exp();

        for coloring in [Coloring::largest_first(&p), Coloring::trivial(4)] {
            for parallel in [false, true] {
                let values = colored_hessian(
                    &residual,
                    &x,
                    &w,
                    &p,
                    &coloring,
                    &h,
                    FiniteDifference::default(),
                    parallel,
                )
                .unwrap();
                for (v, e) in values.iter().zip(&exact) {
                    assert!((v - e).abs() < 1e-6, "{v} vs {e}");
                }
            }
        }
    }

    #[test]
    fn zero_weight_rows_cost_nothing() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let f = |x: &[f64]| {
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            residual(x)
        };
        let p = pattern();
        let h = SparsityPattern::from_rows(4, &hessian_footprints(&p)).unwrap();
        let values = colored_hessian(
            &f,
            &[0.1, 0.2, 0.3, 0.4],
            &[0.0; 4],
            &p,
            &Coloring::largest_first(&p),
            &h,
            FiniteDifference::default(),
            false,
        )
        .unwrap();
        assert!(values.iter().all(|v| *v == 0.0));
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn gradient_skips_unlisted_columns() {
        let f = |x: &[f64]| -> NlpResult<f64> { Ok(x[0] * x[0] + 3.0 * x[1]) };
        let x = [2.0, 1.0, 5.0];
        let g = gradient(&f, &x, f(&x).unwrap(), &[0, 1], FiniteDifference::default()).unwrap();
        assert!((g[0] - 4.0).abs() < 1e-7);
        assert!((g[1] - 3.0).abs() < 1e-7);
        assert_eq!(g[2], 0.0);
    }
}
