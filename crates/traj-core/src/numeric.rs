/// Floating point type used throughout the engine
pub type Real = f64;

/// Magnitude at or beyond which a bound is treated as absent.
pub const INFINITE_BOUND: Real = 1.0e19;

/// Map an optional lower bound onto the solver convention (`-INFINITE_BOUND` when absent).
pub fn lower_or_neg_inf(v: Option<Real>) -> Real {
    v.unwrap_or(-INFINITE_BOUND)
}

/// Map an optional upper bound onto the solver convention (`INFINITE_BOUND` when absent).
pub fn upper_or_inf(v: Option<Real>) -> Real {
    v.unwrap_or(INFINITE_BOUND)
}

pub fn is_finite_bound(v: Real) -> bool {
    v.abs() < INFINITE_BOUND
}

/// Linear interpolation on a sorted abscissa, clamped at both ends.
pub fn lerp_sorted(xs: &[Real], ys: &[Real], x: Real) -> Real {
    debug_assert_eq!(xs.len(), ys.len());
    match xs.len() {
        0 => 0.0,
        1 => ys[0],
        n => {
            if x <= xs[0] {
                return ys[0];
            }
            if x >= xs[n - 1] {
                return ys[n - 1];
            }
            let hi = xs.partition_point(|&xi| xi <= x).min(n - 1);
            let lo = hi - 1;
            let span = xs[hi] - xs[lo];
            if span == 0.0 {
                return ys[hi];
            }
            let w = (x - xs[lo]) / span;
            ys[lo] + w * (ys[hi] - ys[lo])
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn lerp_stays_within_endpoint_span(a in -1e3_f64..1e3, b in -1e3_f64..1e3, x in 0.0_f64..1.0) {
            let y = lerp_sorted(&[0.0, 1.0], &[a, b], x);
            prop_assert!(y >= a.min(b) - 1e-9 && y <= a.max(b) + 1e-9);
        }
    }
}
