//! Dense row-major f64 matrix.
//!
//! The attention kernels operate on one head's worth of 2-D data at a
//! time, so a flat `Vec<f64>` with explicit row/column bookkeeping is
//! all the structure they need. f64 is deliberate: the kernel's
//! numerical contract (1e-6 forward agreement, finite-difference
//! gradient checks) wants the wide type.

/// A dense, row-major, owned f64 matrix.
///
/// # Examples
///
/// ```
/// use tessel_core::Matrix;
///
/// let m = Matrix::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
/// assert_eq!(m.rows(), 2);
/// assert_eq!(m.get(1, 0), 3.0);
/// assert_eq!(m.row(0), &[1.0, 2.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Create a matrix from a flat row-major vector.
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "{}x{} matrix requires {} elements, got {}",
            rows,
            cols,
            rows * cols,
            data.len()
        );
        Self { data, rows, cols }
    }

    /// Create a matrix from row slices. All rows must have equal length.
    pub fn from_rows(rows: &[&[f64]]) -> Self {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            assert_eq!(row.len(), cols, "ragged rows: {} vs {}", row.len(), cols);
            data.extend_from_slice(row);
        }
        Self {
            data,
            rows: rows.len(),
            cols,
        }
    }

    /// Create a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Create a matrix with values from the standard normal N(0, 1).
    pub fn randn(rows: usize, cols: usize) -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        // Box-Muller transform for normal distribution
        let data: Vec<f64> = (0..rows * cols)
            .map(|_| {
                let u1: f64 = rng.gen_range(1e-12f64..1.0f64);
                let u2: f64 = rng.gen_range(0.0f64..std::f64::consts::TAU);
                (-2.0 * u1.ln()).sqrt() * u2.cos()
            })
            .collect();
        Self { data, rows, cols }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Mutable element at (row, col).
    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        &mut self.data[row * self.cols + col]
    }

    /// One row as a slice.
    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// One row as a mutable slice.
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let start = row * self.cols;
        &mut self.data[start..start + self.cols]
    }

    /// The full backing storage, row-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The full backing storage, row-major, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Whether every element is finite (no NaN, no ±inf).
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Largest elementwise absolute difference against another matrix.
    ///
    /// Panics if the shapes disagree; intended for test assertions.
    pub fn max_abs_diff(&self, other: &Matrix) -> f64 {
        assert_eq!(self.rows, other.rows);
        assert_eq!(self.cols, other.cols);
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_and_access() {
        let m = Matrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.get(0, 2), 3.0);
        assert_eq!(m.get(1, 0), 4.0);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic]
    fn test_from_vec_wrong_len_panics() {
        let _ = Matrix::from_vec(vec![1.0, 2.0, 3.0], 2, 2);
    }

    #[test]
    fn test_from_rows() {
        let m = Matrix::from_rows(&[&[1.0, 0.0], &[0.0, 1.0]]);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(1, 0), 0.0);
    }

    #[test]
    fn test_row_mut() {
        let mut m = Matrix::zeros(2, 2);
        m.row_mut(1).copy_from_slice(&[3.0, 4.0]);
        assert_eq!(m.row(0), &[0.0, 0.0]);
        assert_eq!(m.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_randn_shape_and_spread() {
        let m = Matrix::randn(32, 16);
        assert_eq!(m.numel(), 512);
        assert!(m.is_finite());
        // Not all identical
        let first = m.get(0, 0);
        assert!(m.as_slice().iter().any(|&v| v != first));
    }

    #[test]
    fn test_is_finite_catches_nan() {
        let mut m = Matrix::zeros(2, 2);
        assert!(m.is_finite());
        *m.get_mut(1, 1) = f64::NAN;
        assert!(!m.is_finite());
    }

    #[test]
    fn test_max_abs_diff() {
        let a = Matrix::from_vec(vec![1.0, 2.0], 1, 2);
        let b = Matrix::from_vec(vec![1.5, 2.0], 1, 2);
        assert_eq!(a.max_abs_diff(&b), 0.5);
    }
}
