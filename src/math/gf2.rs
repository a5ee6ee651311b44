use std::fmt::Display;

use bitvec::prelude::*;

use crate::error::{CircuitError, Result};

/// Dense matrix over GF(2), one bit-packed row per `BitVec`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gf2Matrix {
    rows: Vec<BitVec<u64, Lsb0>>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl Gf2Matrix {
    pub fn zero(n_rows: usize, n_cols: usize) -> Self {
        Gf2Matrix {
            rows: vec![bitvec![u64, Lsb0; 0; n_cols]; n_rows],
            n_rows,
            n_cols,
        }
    }

    pub fn id(dim: usize) -> Self {
        let mut ret = Gf2Matrix::zero(dim, dim);
        for ix in 0..dim {
            ret.set(ix, ix, true);
        }
        ret
    }

    /// One row per support list, columns given 0-based.
    pub fn from_supports(n_cols: usize, supports: &[Vec<usize>]) -> Self {
        let mut ret = Gf2Matrix::zero(supports.len(), n_cols);
        for (row_ix, support) in supports.iter().enumerate() {
            for col_ix in support {
                ret.set(row_ix, *col_ix, true);
            }
        }
        ret
    }

    pub fn get(&self, row_ix: usize, col_ix: usize) -> bool {
        self.rows[row_ix][col_ix]
    }

    pub fn set(&mut self, row_ix: usize, col_ix: usize, value: bool) {
        self.rows[row_ix].set(col_ix, value);
    }

    pub fn flip(&mut self, row_ix: usize, col_ix: usize) {
        let old = self.get(row_ix, col_ix);
        self.set(row_ix, col_ix, !old);
    }

    pub fn get_row(&self, row_ix: usize) -> &BitSlice<u64, Lsb0> {
        &self.rows[row_ix]
    }

    /// Keeps the listed columns, in the listed order.
    pub fn select_columns(&self, cols: &[usize]) -> Gf2Matrix {
        let mut ret = Gf2Matrix::zero(self.n_rows, cols.len());
        for row_ix in 0..self.n_rows {
            for (new_col, old_col) in cols.iter().enumerate() {
                ret.set(row_ix, new_col, self.get(row_ix, *old_col));
            }
        }
        ret
    }

    fn swap_rows(&mut self, row_1: usize, row_2: usize) {
        if row_1 != row_2 {
            self.rows.swap(row_1, row_2);
        }
    }

    fn add_row_to_other(&mut self, source_row: usize, target_row: usize) {
        let source = self.rows[source_row].as_raw_slice().to_vec();
        for (t, s) in self.rows[target_row].as_raw_mut_slice().iter_mut().zip(source) {
            *t ^= s;
        }
    }

    fn find_first_nonzero_row(&self, col_ix: usize, minimum_row: usize) -> Option<usize> {
        (minimum_row..self.n_rows).find(|row_ix| self.get(*row_ix, col_ix))
    }

    /// Reduced row echelon form in place. Returns the pivot positions.
    fn rref(&mut self) -> Vec<(usize, usize)> {
        let mut pivots = Vec::new();
        let mut pivot_row = 0;
        for col_ix in 0..self.n_cols {
            if pivot_row == self.n_rows {
                break;
            }
            let Some(nonzero_row) = self.find_first_nonzero_row(col_ix, pivot_row) else {
                continue;
            };
            self.swap_rows(pivot_row, nonzero_row);
            for row_ix in 0..self.n_rows {
                if row_ix != pivot_row && self.get(row_ix, col_ix) {
                    self.add_row_to_other(pivot_row, row_ix);
                }
            }
            pivots.push((pivot_row, col_ix));
            pivot_row += 1;
        }
        pivots
    }

    /// Inverts a square matrix by row reducing `[self | id]`. Returns `None`
    /// when the matrix is singular.
    pub fn inverse(&self) -> Option<Gf2Matrix> {
        if self.n_rows != self.n_cols {
            return None;
        }
        let n = self.n_rows;
        let mut augmented = Gf2Matrix::zero(n, 2 * n);
        for row_ix in 0..n {
            for col_ix in 0..n {
                augmented.set(row_ix, col_ix, self.get(row_ix, col_ix));
            }
            augmented.set(row_ix, n + row_ix, true);
        }
        let pivots = augmented.rref();
        if pivots.len() < n || pivots.iter().any(|(_, col)| *col >= n) {
            return None;
        }
        let cols: Vec<usize> = (n..2 * n).collect();
        Some(augmented.select_columns(&cols))
    }

    pub fn mul(&self, rhs: &Gf2Matrix) -> Result<Gf2Matrix> {
        if self.n_cols != rhs.n_rows {
            return Err(CircuitError::consistency(format!(
                "cannot multiply a {}x{} matrix by a {}x{} matrix",
                self.n_rows, self.n_cols, rhs.n_rows, rhs.n_cols
            )));
        }
        let mut ret = Gf2Matrix::zero(self.n_rows, rhs.n_cols);
        for row_ix in 0..self.n_rows {
            for k in self.rows[row_ix].iter_ones() {
                ret.add_row_from(row_ix, rhs.get_row(k));
            }
        }
        Ok(ret)
    }

    fn add_row_from(&mut self, target_row: usize, source: &BitSlice<u64, Lsb0>) {
        for col_ix in source.iter_ones() {
            self.flip(target_row, col_ix);
        }
    }
}

impl Display for Gf2Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.rows.iter() {
            let line: String = row.iter().map(|b| if *b { '1' } else { '0' }).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Gf2Matrix;
    use crate::error::CircuitError;

    #[test]
    fn rref_finds_pivots() {
        let mut m = Gf2Matrix::from_supports(4, &[vec![0, 1], vec![1, 2], vec![0, 2], vec![3]]);
        let pivots = m.rref();
        assert_eq!(pivots, vec![(0, 0), (1, 1), (2, 3)]);
        assert!(!m.get_row(3).any());
    }

    #[test]
    fn inverse_round_trip() {
        let m = Gf2Matrix::from_supports(
            4,
            &[vec![0, 1], vec![1, 2, 3], vec![0, 2], vec![1, 3]],
        );
        let inv = m.inverse().expect("matrix should be invertible");
        assert_eq!(m.mul(&inv).unwrap(), Gf2Matrix::id(4));
        assert_eq!(inv.mul(&m).unwrap(), Gf2Matrix::id(4));
    }

    #[test]
    fn singular_has_no_inverse() {
        let m = Gf2Matrix::from_supports(3, &[vec![0, 1], vec![1, 2], vec![0, 2]]);
        assert!(m.inverse().is_none());
        assert!(Gf2Matrix::zero(2, 3).inverse().is_none());
    }

    #[test]
    fn mismatched_product_is_an_error() {
        let a = Gf2Matrix::zero(2, 3);
        let b = Gf2Matrix::zero(2, 3);
        assert!(matches!(a.mul(&b), Err(CircuitError::Consistency(_))));
        assert_eq!(a.mul(&Gf2Matrix::id(3)).unwrap(), a);
    }

    #[test]
    fn select_and_render() {
        let m = Gf2Matrix::from_supports(3, &[vec![0, 2], vec![1]]);
        let s = m.select_columns(&[2, 1]);
        assert_eq!(s.to_string(), "10\n01\n");
    }
}
