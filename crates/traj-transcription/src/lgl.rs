//! Legendre-Gauss-Lobatto nodes, Lagrange interpolation and the Hermite
//! matrices used by the Gauss-Lobatto collocation scheme.
//!
//! Everything here works on the reference interval `tau in [-1, 1]`.

use nalgebra::DMatrix;

const NEWTON_TOL: f64 = 1e-15;
const NEWTON_MAX_ITER: usize = 100;

/// LGL nodes (ascending) and quadrature weights for `n >= 2` points.
pub fn lgl_nodes(n: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(n >= 2, "LGL rule needs at least two nodes");
    let order = n - 1;

    // Chebyshev-Gauss-Lobatto points as the starting guess.
    let mut x: Vec<f64> = (0..n)
        .map(|i| -(std::f64::consts::PI * i as f64 / order as f64).cos())
        .collect();
    let mut p = vec![vec![0.0; n]; n];

    for _ in 0..NEWTON_MAX_ITER {
        legendre_table(&x, &mut p);
        let mut max_step: f64 = 0.0;
        for i in 0..n {
            let step = (x[i] * p[i][order] - p[i][order - 1]) / (n as f64 * p[i][order]);
            x[i] -= step;
            max_step = max_step.max(step.abs());
        }
        if max_step < NEWTON_TOL {
            break;
        }
    }

    // Enforce exact endpoints and symmetry.
    x[0] = -1.0;
    x[order] = 1.0;
    for i in 0..n / 2 {
        let half = 0.5 * (x[order - i] - x[i]);
        x[i] = -half;
        x[order - i] = half;
    }
    if n % 2 == 1 {
        x[n / 2] = 0.0;
    }

    legendre_table(&x, &mut p);
    let w = (0..n)
        .map(|i| 2.0 / (order as f64 * n as f64 * p[i][order] * p[i][order]))
        .collect();
    (x, w)
}

/// `p[i][k] = P_k(x[i])` by the three-term recurrence.
fn legendre_table(x: &[f64], p: &mut [Vec<f64>]) {
    let order = p[0].len() - 1;
    for (i, &xi) in x.iter().enumerate() {
        p[i][0] = 1.0;
        p[i][1] = xi;
        for k in 2..=order {
            let kf = k as f64;
            p[i][k] = ((2.0 * kf - 1.0) * xi * p[i][k - 1] - (kf - 1.0) * p[i][k - 2]) / kf;
        }
    }
}

/// Barycentric weights of a node set.
pub fn barycentric_weights(nodes: &[f64]) -> Vec<f64> {
    nodes
        .iter()
        .enumerate()
        .map(|(j, &xj)| {
            let prod: f64 = nodes
                .iter()
                .enumerate()
                .filter(|&(m, _)| m != j)
                .map(|(_, &xm)| xj - xm)
                .product();
            1.0 / prod
        })
        .collect()
}

/// Row vector `l` such that `l . values` interpolates at `t`.
pub fn lagrange_row(nodes: &[f64], weights: &[f64], t: f64) -> Vec<f64> {
    if let Some(j) = nodes.iter().position(|&x| x == t) {
        let mut row = vec![0.0; nodes.len()];
        row[j] = 1.0;
        return row;
    }
    let terms: Vec<f64> = nodes
        .iter()
        .zip(weights)
        .map(|(&x, &w)| w / (t - x))
        .collect();
    let total: f64 = terms.iter().sum();
    terms.into_iter().map(|v| v / total).collect()
}

/// Evaluate the Lagrange interpolant through `(nodes, values)` at `t`.
pub fn lagrange_eval(nodes: &[f64], weights: &[f64], values: &[f64], t: f64) -> f64 {
    lagrange_row(nodes, weights, t)
        .iter()
        .zip(values)
        .map(|(l, v)| l * v)
        .sum()
}

/// Differentiation matrix of the Lagrange interpolant at its own nodes.
pub fn differentiation_matrix(nodes: &[f64]) -> DMatrix<f64> {
    let n = nodes.len();
    let w = barycentric_weights(nodes);
    let mut d = DMatrix::zeros(n, n);
    for i in 0..n {
        let mut diag = 0.0;
        for j in 0..n {
            if i != j {
                let v = (w[j] / w[i]) / (nodes[i] - nodes[j]);
                d[(i, j)] = v;
                diag -= v;
            }
        }
        d[(i, i)] = diag;
    }
    d
}

/// Hermite interpolation matrices for one segment.
///
/// With `x_d` the values and `x'_d = dx/dtau` the slopes at the
/// discretization nodes, the interpolant at the collocation nodes is
/// `x_c = ai x_d + bi x'_d` and its slope is `x'_c = ad x_d + bd x'_d`.
#[derive(Clone, Debug, PartialEq)]
pub struct HermiteMatrices {
    pub ai: DMatrix<f64>,
    pub bi: DMatrix<f64>,
    pub ad: DMatrix<f64>,
    pub bd: DMatrix<f64>,
}

/// Build the Hermite matrices from a confluent Vandermonde system.
///
/// Returns `None` if the system is singular (repeated discretization nodes).
pub fn hermite_matrices(tau_d: &[f64], tau_c: &[f64]) -> Option<HermiteMatrices> {
    let nd = tau_d.len();
    let nc = tau_c.len();
    let n = 2 * nd;

    let value_row = |t: f64, p: usize| t.powi(p as i32);
    let slope_row = |t: f64, p: usize| {
        if p == 0 {
            0.0
        } else {
            p as f64 * t.powi(p as i32 - 1)
        }
    };

    let m = DMatrix::from_fn(n, n, |r, p| {
        if r < nd {
            value_row(tau_d[r], p)
        } else {
            slope_row(tau_d[r - nd], p)
        }
    });
    let m_inv = m.try_inverse()?;

    let vc = DMatrix::from_fn(nc, n, |r, p| value_row(tau_c[r], p));
    let vc_slope = DMatrix::from_fn(nc, n, |r, p| slope_row(tau_c[r], p));
    let interp = vc * &m_inv;
    let deriv = vc_slope * &m_inv;

    Some(HermiteMatrices {
        ai: interp.columns(0, nd).into_owned(),
        bi: interp.columns(nd, nd).into_owned(),
        ad: deriv.columns(0, nd).into_owned(),
        bd: deriv.columns(nd, nd).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_point_rule_is_simpson() {
        let (x, w) = lgl_nodes(3);
        assert_eq!(x, vec![-1.0, 0.0, 1.0]);
        assert!((w[0] - 1.0 / 3.0).abs() < 1e-14);
        assert!((w[1] - 4.0 / 3.0).abs() < 1e-14);
    }

    #[test]
    fn five_point_interior_nodes() {
        let (x, _) = lgl_nodes(5);
        let expected = (3.0f64 / 7.0).sqrt();
        assert!((x[3] - expected).abs() < 1e-14);
        assert!((x[1] + expected).abs() < 1e-14);
    }

    #[test]
    fn quadrature_is_exact_for_high_degree() {
        let (x, w) = lgl_nodes(5);
        // exact for degree <= 2n - 3 = 7
        let integral: f64 = x.iter().zip(&w).map(|(xi, wi)| wi * xi.powi(6)).sum();
        assert!((integral - 2.0 / 7.0).abs() < 1e-13);
    }

    #[test]
    fn differentiation_is_exact_for_polynomials() {
        let (x, _) = lgl_nodes(5);
        let d = differentiation_matrix(&x);
        let f: Vec<f64> = x.iter().map(|t| t.powi(4) - 2.0 * t).collect();
        for i in 0..x.len() {
            let df: f64 = (0..x.len()).map(|j| d[(i, j)] * f[j]).sum();
            let exact = 4.0 * x[i].powi(3) - 2.0;
            assert!((df - exact).abs() < 1e-12, "node {i}: {df} vs {exact}");
        }
    }

    #[test]
    fn hermite_simpson_midpoint_weights() {
        let h = hermite_matrices(&[-1.0, 1.0], &[0.0]).unwrap();
        // x_c = (x0 + x1)/2 + (x'0 - x'1)/4 on tau in [-1, 1]
        assert!((h.ai[(0, 0)] - 0.5).abs() < 1e-14);
        assert!((h.ai[(0, 1)] - 0.5).abs() < 1e-14);
        assert!((h.bi[(0, 0)] - 0.25).abs() < 1e-14);
        assert!((h.bi[(0, 1)] + 0.25).abs() < 1e-14);
        // x'_c = 3/4 (x1 - x0) - (x'0 + x'1)/4
        assert!((h.ad[(0, 0)] + 0.75).abs() < 1e-14);
        assert!((h.ad[(0, 1)] - 0.75).abs() < 1e-14);
        assert!((h.bd[(0, 0)] + 0.25).abs() < 1e-14);
        assert!((h.bd[(0, 1)] + 0.25).abs() < 1e-14);
    }

    #[test]
    fn hermite_reproduces_quintic_on_order_two_segment() {
        let (tau, _) = lgl_nodes(5);
        let tau_d = [tau[0], tau[2], tau[4]];
        let tau_c = [tau[1], tau[3]];
        let h = hermite_matrices(&tau_d, &tau_c).unwrap();
        let f = |t: f64| t.powi(5) - t.powi(2) + 3.0;
        let df = |t: f64| 5.0 * t.powi(4) - 2.0 * t;
        for (r, &tc) in tau_c.iter().enumerate() {
            let xc: f64 = (0..3)
                .map(|j| h.ai[(r, j)] * f(tau_d[j]) + h.bi[(r, j)] * df(tau_d[j]))
                .sum();
            let dxc: f64 = (0..3)
                .map(|j| h.ad[(r, j)] * f(tau_d[j]) + h.bd[(r, j)] * df(tau_d[j]))
                .sum();
            assert!((xc - f(tc)).abs() < 1e-12);
            assert!((dxc - df(tc)).abs() < 1e-12);
        }
    }

    #[test]
    fn lagrange_row_hits_nodes_exactly() {
        let (x, _) = lgl_nodes(4);
        let w = barycentric_weights(&x);
        let row = lagrange_row(&x, &w, x[2]);
        assert_eq!(row, vec![0.0, 0.0, 1.0, 0.0]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn nodes_are_symmetric_and_weights_sum_to_two(n in 2usize..12) {
                let (x, w) = lgl_nodes(n);
                for i in 0..n {
                    prop_assert!((x[i] + x[n - 1 - i]).abs() < 1e-14);
                }
                let total: f64 = w.iter().sum();
                prop_assert!((total - 2.0).abs() < 1e-12);
                for pair in x.windows(2) {
                    prop_assert!(pair[0] < pair[1]);
                }
            }

            #[test]
            fn lagrange_reproduces_low_degree(n in 3usize..9, t in -1.0f64..1.0) {
                let (x, _) = lgl_nodes(n);
                let w = barycentric_weights(&x);
                let values: Vec<f64> = x.iter().map(|xi| 2.0 * xi * xi - xi + 0.5).collect();
                let v = lagrange_eval(&x, &w, &values, t);
                prop_assert!((v - (2.0 * t * t - t + 0.5)).abs() < 1e-10);
            }
        }
    }
}
