//! Structural sparsity of the constraint Jacobian and the Lagrangian Hessian.

use crate::error::{NlpError, NlpResult};

/// Row/column triplets in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct SparsityPattern {
    nrows: usize,
    ncols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    /// First entry of every row, plus the total.
    row_offsets: Vec<usize>,
    /// `(row, entry)` pairs of every column.
    by_column: Vec<Vec<(usize, usize)>>,
}

impl SparsityPattern {
    /// Build from the sorted column footprint of every row.
    pub fn from_rows(ncols: usize, footprints: &[Vec<usize>]) -> NlpResult<Self> {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut by_column = vec![Vec::new(); ncols];
        let mut row_offsets = Vec::with_capacity(footprints.len() + 1);
        for (r, footprint) in footprints.iter().enumerate() {
            row_offsets.push(rows.len());
            for &c in footprint {
                if c >= ncols {
                    return Err(NlpError::Dimension {
                        what: "sparsity column",
                        expected: ncols,
                        actual: c,
                    });
                }
                by_column[c].push((r, rows.len()));
                rows.push(r);
                cols.push(c);
            }
        }
        row_offsets.push(rows.len());
        Ok(Self {
            nrows: footprints.len(),
            ncols,
            rows,
            cols,
            row_offsets,
            by_column,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    /// Entry index of the first nonzero of `row`.
    pub fn row_offset(&self, row: usize) -> usize {
        self.row_offsets[row]
    }

    /// Columns of one row, in footprint order.
    pub fn row_columns(&self, row: usize) -> &[usize] {
        &self.cols[self.row_offsets[row]..self.row_offsets[row + 1]]
    }

    /// Entry index of `(row, col)`. Footprints must be sorted.
    pub fn entry(&self, row: usize, col: usize) -> Option<usize> {
        self.row_columns(row)
            .binary_search(&col)
            .ok()
            .map(|k| self.row_offsets[row] + k)
    }

    /// `(row, entry index)` pairs of a column.
    pub fn column_entries(&self, col: usize) -> &[(usize, usize)] {
        &self.by_column[col]
    }

    pub fn density(&self) -> f64 {
        if self.nrows == 0 || self.ncols == 0 {
            return 0.0;
        }
        self.nnz() as f64 / (self.nrows * self.ncols) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplets_are_row_major() {
        let p = SparsityPattern::from_rows(3, &[vec![0, 2], vec![1], vec![0, 1, 2]]).unwrap();
        assert_eq!(p.rows(), &[0, 0, 1, 2, 2, 2]);
        assert_eq!(p.cols(), &[0, 2, 1, 0, 1, 2]);
        assert_eq!(p.column_entries(0), &[(0, 0), (2, 3)]);
        assert_eq!(p.row_columns(2), &[0, 1, 2]);
        assert_eq!(p.row_columns(1), &[1]);
        assert_eq!(p.entry(2, 1), Some(4));
        assert_eq!(p.entry(1, 0), None);
        assert!((p.density() - 6.0 / 9.0).abs() < 1e-15);
    }

    #[test]
    fn out_of_range_column_is_rejected() {
        assert!(SparsityPattern::from_rows(2, &[vec![0, 2]]).is_err());
    }
}
