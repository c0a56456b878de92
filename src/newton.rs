//! Damped Newton solver for the monolithic coupled system
//!
//! One call to [`NewtonSolver::solve_step`] advances the coupled solution
//! over a single time step. Each attempt runs damped Newton iterations on
//! the flattened system with per-subdomain convergence checks; if an
//! attempt diverges or a recoverable numerical error surfaces (non-finite
//! residual, singular or stalled linear solve), the solver rolls the
//! iterate back to the last accepted solution, shrinks the step size and
//! tries again. Only an exhausted retry budget or a step below the
//! configured minimum becomes a hard failure.

use crate::assembly::Assembler;
use crate::config::NewtonControl;
use crate::coupling::CouplingManager;
use crate::domain::{PerDomain, SolutionState, SubdomainId};
use crate::error::{Result, SimulatorError};
use crate::linalg::{Solver, SolverUtils};

/// Record of one Newton attempt at a fixed step size.
#[derive(Debug, Clone)]
pub struct NewtonAttempt {
    /// Step size this attempt ran with (s)
    pub dt: f64,
    /// Completed Newton iterations
    pub iterations: usize,
    /// Linear solver iterations summed over the attempt
    pub linear_iterations: usize,
    pub converged: bool,
    /// Failure description when the attempt did not converge
    pub failure: Option<String>,
}

/// Outcome of one accepted time step, including any failed attempts that
/// preceded the accepted one.
#[derive(Debug, Clone)]
pub struct NewtonStepReport {
    pub attempts: Vec<NewtonAttempt>,
    /// Step size of the accepted attempt (s); smaller than requested if
    /// earlier attempts failed
    pub accepted_dt: f64,
    /// Step size proposed for the next step, before the time loop clamps
    /// it to its bounds
    pub suggested_dt: f64,
    /// Newton iterations of the accepted attempt
    pub iterations: usize,
    pub total_linear_iterations: usize,
}

pub struct NewtonSolver {
    control: NewtonControl,
    linear_solver: Box<dyn Solver>,
}

impl NewtonSolver {
    pub fn new(control: NewtonControl, linear_solver: Box<dyn Solver>) -> Self {
        NewtonSolver {
            control,
            linear_solver,
        }
    }

    /// Solve one time step starting from the accepted solution `old`.
    ///
    /// On success `new` holds the converged iterate and the report states
    /// the step size actually used. On failure `new` is unspecified; the
    /// caller owns `old` and loses nothing.
    pub fn solve_step(
        &mut self,
        assembler: &Assembler,
        manager: &mut CouplingManager,
        new: &mut SolutionState,
        old: &SolutionState,
        time: f64,
        dt: f64,
        min_dt: f64,
    ) -> Result<NewtonStepReport> {
        let mut dt_attempt = dt;
        let mut attempts: Vec<NewtonAttempt> = Vec::new();

        loop {
            new.assign_from(old);
            let attempt = self.attempt(assembler, manager, new, old, dt_attempt)?;
            let converged = attempt.converged;
            let iterations = attempt.iterations;
            let failure = attempt.failure.clone();
            attempts.push(attempt);

            if converged {
                let suggested_dt = if iterations <= self.control.growth_iterations {
                    dt_attempt * self.control.growth_factor
                } else {
                    dt_attempt
                };
                let total_linear_iterations =
                    attempts.iter().map(|a| a.linear_iterations).sum();
                return Ok(NewtonStepReport {
                    attempts,
                    accepted_dt: dt_attempt,
                    suggested_dt,
                    iterations,
                    total_linear_iterations,
                });
            }

            let failures = attempts.len();
            let reason = failure.unwrap_or_else(|| "did not converge".to_string());
            if self.control.verbose {
                println!(
                    "    Newton: attempt with dt = {:.3e} s failed ({})",
                    dt_attempt, reason
                );
            }

            if failures >= self.control.max_consecutive_failures {
                return Err(SimulatorError::ConvergenceFailure {
                    time,
                    dt: dt_attempt,
                    failures,
                    reason,
                });
            }

            let reduced = dt_attempt * self.control.reduction_factor;
            if reduced < min_dt {
                return Err(SimulatorError::ConvergenceFailure {
                    time,
                    dt: dt_attempt,
                    failures,
                    reason: format!(
                        "reduced step {:.3e} s fell below the minimum {:.3e} s",
                        reduced, min_dt
                    ),
                });
            }
            dt_attempt = reduced;
        }
    }

    /// One Newton run at a fixed step size. Recoverable numerical errors
    /// are folded into the returned record; only contract violations
    /// propagate as errors.
    fn attempt(
        &mut self,
        assembler: &Assembler,
        manager: &mut CouplingManager,
        new: &mut SolutionState,
        old: &SolutionState,
        dt: f64,
    ) -> Result<NewtonAttempt> {
        let mut iterations = 0;
        let mut linear_iterations = 0;
        match self.iterate(
            assembler,
            manager,
            new,
            old,
            dt,
            &mut iterations,
            &mut linear_iterations,
        ) {
            Ok(converged) => {
                let failure = if converged {
                    None
                } else {
                    Some(format!(
                        "no convergence within {} iterations",
                        self.control.max_iterations
                    ))
                };
                Ok(NewtonAttempt {
                    dt,
                    iterations,
                    linear_iterations,
                    converged,
                    failure,
                })
            }
            Err(e) if e.is_recoverable() => Ok(NewtonAttempt {
                dt,
                iterations,
                linear_iterations,
                converged: false,
                failure: Some(e.to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    fn iterate(
        &mut self,
        assembler: &Assembler,
        manager: &mut CouplingManager,
        new: &mut SolutionState,
        old: &SolutionState,
        dt: f64,
        iterations: &mut usize,
        linear_iterations: &mut usize,
    ) -> Result<bool> {
        let mut residual = assembler.assemble_residual(new, old, dt, manager)?;
        // Convergence is judged against the residual of the first iterate
        let reference = residual_norms(&residual);
        let mut norms = reference.clone();

        loop {
            if self.converged(&norms, &reference) {
                if self.control.verbose {
                    println!("    Newton: converged in {} iterations", iterations);
                }
                return Ok(true);
            }
            if *iterations >= self.control.max_iterations {
                return Ok(false);
            }

            let jacobian = assembler.assemble_jacobian(new, old, dt, manager)?;
            let rhs = flatten_residual(&residual);
            let (delta, stats) = self.linear_solver.solve(&jacobian.flatten(), &rhs)?;
            *linear_iterations += stats.iterations;

            new.apply_update(&delta, self.control.damping);
            *iterations += 1;

            residual = assembler.assemble_residual(new, old, dt, manager)?;
            norms = residual_norms(&residual);

            if self.control.verbose {
                println!(
                    "    Newton iter {:2}: ||R||_flow = {:.3e}, ||R||_mech = {:.3e}, \
                     linear iters = {:3}",
                    iterations,
                    norms[SubdomainId::Flow],
                    norms[SubdomainId::Mechanics],
                    stats.iterations
                );
            }
        }
    }

    /// Per-subdomain check: each residual norm must satisfy either its
    /// absolute tolerance or the relative reduction target.
    fn converged(&self, norms: &PerDomain<f64>, reference: &PerDomain<f64>) -> bool {
        SubdomainId::ALL.iter().all(|&id| {
            let abs_tol = match id {
                SubdomainId::Flow => self.control.abs_tolerance_flow,
                SubdomainId::Mechanics => self.control.abs_tolerance_mechanics,
            };
            norms[id] <= abs_tol || norms[id] <= self.control.rel_tolerance * reference[id]
        })
    }
}

fn residual_norms(residual: &PerDomain<Vec<f64>>) -> PerDomain<f64> {
    PerDomain::from_fn(|id| SolverUtils::norm(&residual[id]))
}

/// Stack the two residual blocks in the flow-first global ordering shared
/// with [`SolutionState::apply_update`].
fn flatten_residual(residual: &PerDomain<Vec<f64>>) -> Vec<f64> {
    let mut rhs = Vec::with_capacity(
        residual[SubdomainId::Flow].len() + residual[SubdomainId::Mechanics].len(),
    );
    rhs.extend_from_slice(&residual[SubdomainId::Flow]);
    rhs.extend_from_slice(&residual[SubdomainId::Mechanics]);
    rhs
}
