pub mod direct;
pub mod iterative;
pub mod preconditioner;
pub mod solver;

pub use direct::DirectSolver;
pub use iterative::BiCGSTAB;
pub use preconditioner::{
    ILUPreconditioner, IdentityPreconditioner, JacobiPreconditioner, Preconditioner,
    PreconditionerKind,
};
pub use solver::{Solver, SolverStats, SolverUtils};

use crate::config::LinearSolverConfig;
use crate::error::{Result, SimulatorError};

/// Build the linear solver selected in the configuration.
pub fn solver_from_config(config: &LinearSolverConfig) -> Result<Box<dyn Solver>> {
    match config.method.as_str() {
        "direct" => Ok(Box::new(DirectSolver::new())),
        "bicgstab" => {
            let kind = PreconditionerKind::from_name(&config.preconditioner)?;
            Ok(Box::new(
                BiCGSTAB::new()
                    .with_tolerance(config.tolerance)
                    .with_max_iterations(config.max_iterations)
                    .with_preconditioner(kind),
            ))
        }
        other => Err(SimulatorError::Configuration(format!(
            "unknown linear solver method \"{}\" (expected \"direct\" or \"bicgstab\")",
            other
        ))),
    }
}
