//! Column coloring for compressed finite-difference Jacobians.
//!
//! Two columns may share a color when no row has a structural nonzero in
//! both. Perturbing every column of one color at once then recovers each
//! column's entries unambiguously.

use tracing::debug;

use crate::sparsity::SparsityPattern;

#[derive(Clone, Debug, PartialEq)]
pub struct Coloring {
    /// Color of every column.
    pub colors: Vec<usize>,
    /// Columns of each color.
    pub groups: Vec<Vec<usize>>,
}

impl Coloring {
    /// Every column in its own group.
    pub fn trivial(ncols: usize) -> Self {
        Self {
            colors: (0..ncols).collect(),
            groups: (0..ncols).map(|c| vec![c]).collect(),
        }
    }

    /// Greedy coloring, visiting columns by decreasing nonzero count.
    pub fn largest_first(pattern: &SparsityPattern) -> Self {
        let ncols = pattern.ncols();
        let mut order: Vec<usize> = (0..ncols).collect();
        order.sort_by(|&a, &b| {
            pattern
                .column_entries(b)
                .len()
                .cmp(&pattern.column_entries(a).len())
                .then(a.cmp(&b))
        });

        let mut colors = vec![usize::MAX; ncols];
        // Colors already present in each row.
        let mut row_colors: Vec<Vec<usize>> = vec![Vec::new(); pattern.nrows()];
        let mut forbidden: Vec<bool> = Vec::new();

        for col in order {
            forbidden.iter_mut().for_each(|f| *f = false);
            for &(row, _) in pattern.column_entries(col) {
                for &c in &row_colors[row] {
                    if c >= forbidden.len() {
                        forbidden.resize(c + 1, false);
                    }
                    forbidden[c] = true;
                }
            }
            let color = forbidden.iter().position(|f| !f).unwrap_or(forbidden.len());
            colors[col] = color;
            for &(row, _) in pattern.column_entries(col) {
                row_colors[row].push(color);
            }
        }

        let num_colors = colors.iter().map(|c| c + 1).max().unwrap_or(0);
        let mut groups = vec![Vec::new(); num_colors];
        for (col, &color) in colors.iter().enumerate() {
            groups[color].push(col);
        }
        debug!(
            columns = ncols,
            colors = num_colors,
            nnz = pattern.nnz(),
            "jacobian coloring"
        );
        Self { colors, groups }
    }

    pub fn num_colors(&self) -> usize {
        self.groups.len()
    }

    /// Whether no row touches two columns of the same color.
    pub fn is_valid_for(&self, pattern: &SparsityPattern) -> bool {
        let mut seen = vec![Vec::new(); pattern.nrows()];
        for col in 0..pattern.ncols() {
            for &(row, _) in pattern.column_entries(col) {
                if seen[row].contains(&self.colors[col]) {
                    return false;
                }
                seen[row].push(self.colors[col]);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banded_pattern_needs_bandwidth_colors() {
        // Tridiagonal 6x6.
        let rows: Vec<Vec<usize>> = (0..6usize)
            .map(|r| (r.saturating_sub(1)..=(r + 1).min(5)).collect())
            .collect();
        let p = SparsityPattern::from_rows(6, &rows).unwrap();
        let coloring = Coloring::largest_first(&p);
        assert_eq!(coloring.num_colors(), 3);
        assert!(coloring.is_valid_for(&p));
    }

    #[test]
    fn dense_column_gets_its_own_color() {
        let rows = vec![vec![0, 1], vec![0, 2], vec![0, 3]];
        let p = SparsityPattern::from_rows(4, &rows).unwrap();
        let coloring = Coloring::largest_first(&p);
        assert_eq!(coloring.colors[0], 0);
        assert_eq!(coloring.num_colors(), 2);
        assert_eq!(coloring.groups[1], vec![1, 2, 3]);
    }

    #[test]
    fn empty_columns_share_the_first_color() {
        let p = SparsityPattern::from_rows(3, &[vec![1]]).unwrap();
        let coloring = Coloring::largest_first(&p);
        assert_eq!(coloring.num_colors(), 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn greedy_coloring_is_always_valid(
                rows in prop::collection::vec(prop::collection::btree_set(0usize..12, 0..5), 1..15)
            ) {
                let rows: Vec<Vec<usize>> = rows.into_iter().map(|s| s.into_iter().collect()).collect();
                let p = SparsityPattern::from_rows(12, &rows).unwrap();
                let coloring = Coloring::largest_first(&p);
                prop_assert!(coloring.is_valid_for(&p));
                prop_assert!(coloring.num_colors() <= 12);
            }
        }
    }
}
