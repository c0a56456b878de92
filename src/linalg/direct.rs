use sprs::CsMat;
use std::time::Instant;

use super::solver::{Solver, SolverStats, SolverUtils};
use crate::error::{Result, SimulatorError};

/// Direct solver using dense LU decomposition
///
/// The coupled column Jacobian stays small (a few hundred dofs), so
/// densifying the sparse matrix and factorizing with nalgebra is cheaper
/// than sparse pivot bookkeeping and has no convergence failure modes. A
/// singular matrix is reported as a recoverable linear solver error.
#[derive(Debug)]
pub struct DirectSolver {
    name: String,
}

impl DirectSolver {
    pub fn new() -> Self {
        Self {
            name: "Direct (dense LU)".to_string(),
        }
    }
}

impl Default for DirectSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for DirectSolver {
    #[allow(non_snake_case)]
    fn solve(&mut self, A: &CsMat<f64>, b: &[f64]) -> Result<(Vec<f64>, SolverStats)> {
        let start = Instant::now();
        let n = b.len();

        let mut a_dense = nalgebra::DMatrix::zeros(n, n);
        for (row_idx, row) in A.outer_iterator().enumerate() {
            for (col_idx, &val) in row.iter() {
                a_dense[(row_idx, col_idx)] = val;
            }
        }

        let lu = a_dense.lu();
        let b_vec = nalgebra::DVector::from_vec(b.to_vec());
        let x_vec = lu.solve(&b_vec).ok_or_else(|| {
            SimulatorError::LinearSolve(
                "LU factorization hit a zero pivot (singular Jacobian)".to_string(),
            )
        })?;
        let x: Vec<f64> = x_vec.iter().copied().collect();

        let solve_time = start.elapsed().as_secs_f64();
        let residual_norm = SolverUtils::residual_norm(A, &x, b);
        let relative_residual = SolverUtils::relative_residual(A, &x, b);

        Ok((
            x,
            SolverStats {
                iterations: 0,
                residual_norm,
                relative_residual,
                solve_time,
            },
        ))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
