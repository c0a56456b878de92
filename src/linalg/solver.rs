//! Linear solver interface and shared vector helpers

use sprs::CsMat;

use crate::error::Result;

/// Statistics from one linear solve.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Number of iterations (0 for the direct solver)
    pub iterations: usize,

    /// Final residual norm ||r|| = ||b - Ax||
    pub residual_norm: f64,

    /// Relative residual ||r|| / ||b||
    pub relative_residual: f64,

    /// Solve time in seconds
    pub solve_time: f64,
}

/// Solves Ax = b for the flattened coupled Jacobian.
///
/// Failure (singular matrix, breakdown, iteration cap) goes through the
/// error channel so the caller can shrink the time step and retry; a
/// returned solution is always usable.
pub trait Solver: std::fmt::Debug {
    #[allow(non_snake_case)]
    fn solve(&mut self, A: &CsMat<f64>, b: &[f64]) -> Result<(Vec<f64>, SolverStats)>;

    fn name(&self) -> &str;
}

/// Helper functions shared by the solvers and the Newton loop
pub struct SolverUtils;

impl SolverUtils {
    /// Compute L2 norm of a vector
    pub fn norm(v: &[f64]) -> f64 {
        v.iter().map(|&x| x * x).sum::<f64>().sqrt()
    }

    /// Sparse matrix-vector product y = A v
    #[allow(non_snake_case)]
    pub fn spmv(A: &CsMat<f64>, v: &[f64]) -> Vec<f64> {
        let mut result = vec![0.0; A.rows()];
        for (row_idx, row) in A.outer_iterator().enumerate() {
            let mut sum = 0.0;
            for (col_idx, &val) in row.iter() {
                sum += val * v[col_idx];
            }
            result[row_idx] = sum;
        }
        result
    }

    /// Compute residual r = b - Ax
    #[allow(non_snake_case)]
    pub fn compute_residual(A: &CsMat<f64>, x: &[f64], b: &[f64]) -> Vec<f64> {
        let ax = Self::spmv(A, x);
        b.iter()
            .zip(ax.iter())
            .map(|(&bi, &axi)| bi - axi)
            .collect()
    }

    /// Compute residual norm ||b - Ax||
    #[allow(non_snake_case)]
    pub fn residual_norm(A: &CsMat<f64>, x: &[f64], b: &[f64]) -> f64 {
        Self::norm(&Self::compute_residual(A, x, b))
    }

    /// Compute relative residual ||b - Ax|| / ||b||
    #[allow(non_snake_case)]
    pub fn relative_residual(A: &CsMat<f64>, x: &[f64], b: &[f64]) -> f64 {
        let r_norm = Self::residual_norm(A, x, b);
        let b_norm = Self::norm(b);

        if b_norm < 1e-14 {
            r_norm
        } else {
            r_norm / b_norm
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    #[test]
    fn test_norm() {
        assert_relative_eq!(SolverUtils::norm(&[3.0, 4.0]), 5.0, epsilon = 1e-14);
    }

    #[test]
    fn test_residual() {
        // [2 1; 1 2] x = [3; 3] has solution x = [1; 1]
        let mut triplets = TriMat::new((2, 2));
        triplets.add_triplet(0, 0, 2.0);
        triplets.add_triplet(0, 1, 1.0);
        triplets.add_triplet(1, 0, 1.0);
        triplets.add_triplet(1, 1, 2.0);
        let a = triplets.to_csr();

        let r_norm = SolverUtils::residual_norm(&a, &[1.0, 1.0], &[3.0, 3.0]);
        assert_relative_eq!(r_norm, 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_spmv() {
        let mut triplets = TriMat::new((2, 3));
        triplets.add_triplet(0, 0, 1.0);
        triplets.add_triplet(0, 2, 2.0);
        triplets.add_triplet(1, 1, -1.0);
        let a = triplets.to_csr();

        let y = SolverUtils::spmv(&a, &[1.0, 2.0, 3.0]);
        assert_relative_eq!(y[0], 7.0);
        assert_relative_eq!(y[1], -2.0);
    }
}
