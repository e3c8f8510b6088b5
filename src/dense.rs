use num_traits::Zero;
use std::ops::{Add, Mul};

/// Dense matrix with values stored in row-major order (C-style).
///
/// Used for PTDF/BODF factors and per-snapshot flow tables. Matrices
/// published by the engine are only ever handed out by shared reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mat<T> {
    rows: usize,
    cols: usize,
    values: Vec<T>,
}

impl<T> Mat<T>
where
    T: Copy + Zero,
{
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![T::zero(); rows * cols],
        }
    }

    /// Builds a matrix from row-major `values`.
    pub fn from_rows(rows: usize, cols: usize, values: Vec<T>) -> Result<Self, String> {
        if values.len() != rows * cols {
            return Err(format!(
                "values length ({}) must be rows * cols ({} * {} = {})",
                values.len(),
                rows,
                cols,
                rows * cols
            ));
        }
        Ok(Self { rows, cols, values })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn cols(&self) -> usize {
        self.cols
    }
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    fn ix(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.values[self.ix(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, v: T) {
        let i = self.ix(row, col);
        self.values[i] = v
    }

    pub fn row(&self, row: usize) -> &[T] {
        assert!(row < self.rows);
        &self.values[row * self.cols..(row + 1) * self.cols]
    }

    pub(crate) fn row_mut(&mut self, row: usize) -> &mut [T] {
        assert!(row < self.rows);
        let cols = self.cols;
        &mut self.values[row * cols..(row + 1) * cols]
    }

    pub fn col(&self, col: usize) -> impl Iterator<Item = T> + '_ {
        assert!(col < self.cols);
        (0..self.rows).map(move |row| self.get(row, col))
    }

    pub fn diagonal(&self) -> impl Iterator<Item = T> + '_ {
        assert_eq!(self.rows, self.cols);
        (0..self.rows).map(move |i| self.get(i, i))
    }

    pub fn mat_vec(&self, b: &[T]) -> Vec<T>
    where
        T: Mul<Output = T> + Add<Output = T>,
    {
        assert_eq!(b.len(), self.cols);
        (0..self.rows).map(|i| dot(self.row(i), b)).collect()
    }

    pub fn mat_mat(&self, b: &Self) -> Self
    where
        T: Mul<Output = T> + Add<Output = T>,
    {
        assert_eq!(
            self.cols, b.rows,
            "rows of b {} must equal columns of a {}",
            b.rows, self.cols
        );
        let mut c = Self::zeros(self.rows, b.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a_ik = self.get(i, k);
                if a_ik.is_zero() {
                    continue;
                }
                for (c_ij, &b_kj) in c.row_mut(i).iter_mut().zip(b.row(k)) {
                    *c_ij = *c_ij + a_ik * b_kj;
                }
            }
        }
        c
    }
}

/// Computes the dot-product of `a` and `b`.
pub fn dot<T>(a: &[T], b: &[T]) -> T
where
    T: Mul<Output = T> + Add<Output = T> + Zero + Copy,
{
    a.iter()
        .zip(b)
        .map(|(&ai, &bi)| ai * bi)
        .fold(T::zero(), |x, y| x + y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat_mat() -> Result<(), String> {
        let a = Mat::from_rows(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let b = Mat::from_rows(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0])?;
        let c = a.mat_mat(&b);
        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.values(), &[58.0, 64.0, 139.0, 154.0]);
        Ok(())
    }

    #[test]
    fn test_mat_vec() -> Result<(), String> {
        let a = Mat::from_rows(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        assert_eq!(a.mat_vec(&[1.0, 0.0, -1.0]), vec![-2.0, -2.0]);
        assert_eq!(a.col(2).collect::<Vec<f64>>(), vec![3.0, 6.0]);
        assert!(Mat::<f64>::from_rows(2, 2, vec![0.0]).is_err());
        Ok(())
    }
}
