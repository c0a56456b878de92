use sprs::CsMat;
use std::time::Instant;

use super::preconditioner::{Preconditioner, PreconditionerKind};
use super::solver::{Solver, SolverStats, SolverUtils};
use crate::error::{Result, SimulatorError};

/// BiCGSTAB (Biconjugate Gradient Stabilized) solver
///
/// Handles the non-symmetric coupled Jacobian. The preconditioner is
/// rebuilt for every solve because the Jacobian changes with each Newton
/// iteration. Breakdown and a spent iteration budget both surface as
/// recoverable linear solver errors.
#[derive(Debug)]
pub struct BiCGSTAB {
    max_iterations: usize,
    tolerance: f64,
    preconditioner: PreconditionerKind,
    verbose: bool,
    name: String,
}

impl BiCGSTAB {
    pub fn new() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-10,
            preconditioner: PreconditionerKind::Ilu0,
            verbose: false,
            name: "BiCGSTAB".to_string(),
        }
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_preconditioner(mut self, kind: PreconditionerKind) -> Self {
        self.preconditioner = kind;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn run(
        &self,
        a: &CsMat<f64>,
        b: &[f64],
        precond: &dyn Preconditioner,
    ) -> (Vec<f64>, SolverStats, bool) {
        let n = b.len();
        let start = Instant::now();
        let b_norm = SolverUtils::norm(b);

        if b_norm < 1e-25 {
            let stats = SolverStats {
                iterations: 0,
                residual_norm: 0.0,
                relative_residual: 0.0,
                solve_time: start.elapsed().as_secs_f64(),
            };
            return (vec![0.0; n], stats, true);
        }

        let mut x = vec![0.0; n];
        let mut r = b.to_vec();
        let r_hat = r.clone();

        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut v = vec![0.0; n];
        let mut p = vec![0.0; n];

        let mut total_iter = 0;
        let mut converged = false;
        let mut final_res = b_norm;

        while total_iter < self.max_iterations {
            let rho_prev = rho;
            rho = r_hat
                .iter()
                .zip(r.iter())
                .map(|(&ri_h, &ri)| ri_h * ri)
                .sum::<f64>();

            if rho.abs() < 1e-40 {
                break;
            }

            if total_iter == 0 {
                p = r.clone();
            } else {
                let beta = (rho / rho_prev) * (alpha / omega);
                for i in 0..n {
                    p[i] = r[i] + beta * (p[i] - omega * v[i]);
                }
            }

            let p_hat = precond.apply(&p);
            v = SolverUtils::spmv(a, &p_hat);

            let rhat_v = r_hat
                .iter()
                .zip(v.iter())
                .map(|(&ri_h, &vi)| ri_h * vi)
                .sum::<f64>();
            if rhat_v.abs() < 1e-40 {
                break;
            }
            alpha = rho / rhat_v;

            let mut s = vec![0.0; n];
            for i in 0..n {
                s[i] = r[i] - alpha * v[i];
            }

            let s_norm = SolverUtils::norm(&s);
            if s_norm < self.tolerance * b_norm {
                for i in 0..n {
                    x[i] += alpha * p_hat[i];
                }
                final_res = s_norm;
                converged = true;
                break;
            }

            let s_hat = precond.apply(&s);
            let t = SolverUtils::spmv(a, &s_hat);

            let t_t = t.iter().map(|&ti| ti * ti).sum::<f64>();
            let t_s = t.iter().zip(s.iter()).map(|(&ti, &si)| ti * si).sum::<f64>();

            if t_t.abs() < 1e-40 {
                break;
            }
            omega = t_s / t_t;

            for i in 0..n {
                x[i] += alpha * p_hat[i] + omega * s_hat[i];
                r[i] = s[i] - omega * t[i];
            }

            final_res = SolverUtils::norm(&r);
            total_iter += 1;

            if self.verbose && total_iter % 50 == 0 {
                println!(
                    "        BiCGSTAB iter {:4}: res = {:.3e}, rel = {:.3e}",
                    total_iter,
                    final_res,
                    final_res / b_norm
                );
            }

            if final_res < self.tolerance * b_norm {
                converged = true;
                break;
            }
            if omega.abs() < 1e-40 {
                break;
            }
        }

        let stats = SolverStats {
            iterations: total_iter,
            residual_norm: final_res,
            relative_residual: final_res / b_norm,
            solve_time: start.elapsed().as_secs_f64(),
        };
        (x, stats, converged)
    }
}

impl Default for BiCGSTAB {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for BiCGSTAB {
    #[allow(non_snake_case)]
    fn solve(&mut self, A: &CsMat<f64>, b: &[f64]) -> Result<(Vec<f64>, SolverStats)> {
        let precond = self.preconditioner.build(A)?;
        let (x, stats, converged) = self.run(A, b, precond.as_ref());
        if converged {
            Ok((x, stats))
        } else {
            Err(SimulatorError::LinearSolve(format!(
                "BiCGSTAB did not reach tolerance {:.1e} within {} iterations \
                 (relative residual {:.3e})",
                self.tolerance, stats.iterations, stats.relative_residual
            )))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    fn laplacian_1d(n: usize) -> CsMat<f64> {
        let mut triplets = TriMat::new((n, n));
        for i in 0..n {
            triplets.add_triplet(i, i, 2.0);
            if i > 0 {
                triplets.add_triplet(i, i - 1, -1.0);
            }
            if i + 1 < n {
                triplets.add_triplet(i, i + 1, -1.0);
            }
        }
        triplets.to_csr()
    }

    #[test]
    fn test_bicgstab_tridiagonal_jacobi() {
        let n = 10;
        let a = laplacian_1d(n);
        // b = A * ones, so the solution is all ones
        let b = SolverUtils::spmv(&a, &vec![1.0; n]);

        let mut solver = BiCGSTAB::new()
            .with_tolerance(1e-12)
            .with_preconditioner(PreconditionerKind::Jacobi);
        let (x, stats) = solver.solve(&a, &b).unwrap();

        for xi in &x {
            assert_relative_eq!(*xi, 1.0, epsilon = 1e-8);
        }
        assert!(stats.iterations > 0);
    }

    #[test]
    fn test_bicgstab_nonsymmetric_ilu0() {
        // Non-symmetric 3x3 system
        // [ 4 -1  0 ]        [ 2 ]
        // [-2  5 -1 ] x  =   [ 1 ]
        // [ 0 -3  6 ]        [ 3 ]
        let mut triplets = TriMat::new((3, 3));
        triplets.add_triplet(0, 0, 4.0);
        triplets.add_triplet(0, 1, -1.0);
        triplets.add_triplet(1, 0, -2.0);
        triplets.add_triplet(1, 1, 5.0);
        triplets.add_triplet(1, 2, -1.0);
        triplets.add_triplet(2, 1, -3.0);
        triplets.add_triplet(2, 2, 6.0);
        let a = triplets.to_csr();
        let b = vec![2.0, 1.0, 3.0];

        let mut solver = BiCGSTAB::new()
            .with_tolerance(1e-12)
            .with_preconditioner(PreconditionerKind::Ilu0);
        let (x, _) = solver.solve(&a, &b).unwrap();

        let residual = SolverUtils::residual_norm(&a, &x, &b);
        assert!(residual < 1e-9, "residual {}", residual);
    }

    #[test]
    fn test_bicgstab_unpreconditioned() {
        let a = laplacian_1d(5);
        let b = SolverUtils::spmv(&a, &[1.0, -1.0, 2.0, 0.5, 0.0]);

        let mut solver = BiCGSTAB::new()
            .with_tolerance(1e-12)
            .with_preconditioner(PreconditionerKind::None);
        let (x, _) = solver.solve(&a, &b).unwrap();
        assert_relative_eq!(x[2], 2.0, epsilon = 1e-8);
    }

    #[test]
    fn test_iteration_cap_is_recoverable_error() {
        let n = 40;
        let a = laplacian_1d(n);
        let mut b = vec![0.0; n];
        b[0] = 1.0;

        let mut solver = BiCGSTAB::new()
            .with_tolerance(1e-14)
            .with_max_iterations(1)
            .with_preconditioner(PreconditionerKind::None);
        let err = solver.solve(&a, &b).unwrap_err();
        assert!(matches!(err, SimulatorError::LinearSolve(_)));
        assert!(err.is_recoverable());
    }
}
