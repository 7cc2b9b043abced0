//! Eigendecomposition of the symmetric covariance matrix.
//!
//! Matrices are dense, row-major `n * n` slices. The decomposition itself is
//! [`nalgebra::SymmetricEigen`]; this module only converts between layouts.

use nalgebra::DMatrix;

/// Eigenvalues and eigenvectors of a symmetric matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricEigen {
    /// Unsorted eigenvalues.
    pub values: Vec<f64>,
    /// Row-major `n * n`; column `j` is the unit eigenvector of `values[j]`.
    pub vectors: Vec<f64>,
}

/// Identity matrix of size `n`, row-major.
#[must_use]
pub fn identity(n: usize) -> Vec<f64> {
    DMatrix::<f64>::identity(n, n).as_slice().to_vec()
}

/// Decomposes the symmetric matrix `matrix` (`n * n`, row-major) as `B diag(values) Bᵀ`.
///
/// # Panics
///
/// Panics if `matrix` does not hold `n * n` entries.
#[must_use]
pub fn symmetric_eigen(matrix: &[f64], n: usize) -> SymmetricEigen {
    assert_eq!(matrix.len(), n * n);
    let eigen = DMatrix::from_row_slice(n, n, matrix).symmetric_eigen();
    SymmetricEigen {
        values: eigen.eigenvalues.iter().copied().collect(),
        // column-major storage of Bᵀ is the row-major layout of B
        vectors: eigen.eigenvectors.transpose().as_slice().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(eigen: &SymmetricEigen, n: usize) -> Vec<f64> {
        let b = &eigen.vectors;
        let mut m = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                m[i * n + j] = (0..n)
                    .map(|k| b[i * n + k] * eigen.values[k] * b[j * n + k])
                    .sum();
            }
        }
        m
    }

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_identity() {
        assert_eq!(identity(2), vec![1.0, 0.0, 0.0, 1.0]);
        assert!(identity(0).is_empty());
    }

    #[test]
    fn test_diagonal_matrix() {
        let m = [3.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0];
        let eigen = symmetric_eigen(&m, 3);
        let mut values = eigen.values.clone();
        values.sort_by(f64::total_cmp);
        assert_close(&values, &[1.0, 2.0, 3.0], 1e-12);
        assert_close(&reconstruct(&eigen, 3), &m, 1e-12);
    }

    #[test]
    fn test_two_by_two() {
        // eigenvalues 1 and 3
        let m = [2.0, 1.0, 1.0, 2.0];
        let eigen = symmetric_eigen(&m, 2);
        let mut values = eigen.values.clone();
        values.sort_by(f64::total_cmp);
        assert_close(&values, &[1.0, 3.0], 1e-12);
        assert_close(&reconstruct(&eigen, 2), &m, 1e-12);
    }

    #[test]
    fn test_reconstructs_dense_matrix() {
        let n = 4;
        let m = [
            4.0, 1.0, -2.0, 0.5, //
            1.0, 3.0, 0.0, -1.0, //
            -2.0, 0.0, 5.0, 2.0, //
            0.5, -1.0, 2.0, 6.0,
        ];
        let eigen = symmetric_eigen(&m, n);
        assert_close(&reconstruct(&eigen, n), &m, 1e-10);

        // eigenvectors are orthonormal
        let b = &eigen.vectors;
        for i in 0..n {
            for j in 0..n {
                let dot = (0..n).map(|k| b[k * n + i] * b[k * n + j]).sum::<f64>();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-10);
            }
        }

        let trace = (0..n).map(|i| m[i * n + i]).sum::<f64>();
        assert!((eigen.values.iter().sum::<f64>() - trace).abs() < 1e-10);
    }
}
