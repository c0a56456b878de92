//! Error taxonomy and process exit-code mapping
//!
//! Every fallible operation in the crate returns [`SimulatorError`]. The
//! variants split into two classes: fatal errors (bad configuration, bad
//! mesh, contract violations) that propagate unchanged to the driver, and
//! recoverable errors (failed assembly, singular linear system, exhausted
//! Newton iterations) that the nonlinear solver absorbs by shrinking the
//! time step and retrying from the last accepted solution.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimulatorError>;

/// Process exit codes reported by the driver binary.
///
/// Codes are distinct so a caller can tell user error (bad input file,
/// bad grid) from an internal numerical failure without parsing stderr.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const CONFIGURATION: i32 = 1;
    pub const MESH: i32 = 2;
    pub const FRAMEWORK: i32 = 3;
    pub const UNKNOWN: i32 = 4;
}

#[derive(Debug, Error)]
pub enum SimulatorError {
    /// Malformed or out-of-range input parameter. Reported before any
    /// stepping begins.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Degenerate or inconsistent grid geometry.
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Coupling manager could not bind the subdomains.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// A residual or Jacobian entry evaluated to NaN/inf. Recoverable:
    /// the Newton solver treats it as divergence of the current attempt.
    #[error("assembly error: non-finite {quantity} in {domain} subdomain at dof {dof}")]
    Assembly {
        domain: &'static str,
        dof: usize,
        quantity: &'static str,
    },

    /// The linear system was singular or the iterative solver broke down.
    /// Recoverable through the same retry path as divergence.
    #[error("linear solve error: {0}")]
    LinearSolve(String),

    /// Newton exhausted its retry budget for one time step.
    #[error(
        "convergence failure at t = {time:.6e} s: {failures} consecutive failed attempts, \
         last step size {dt:.3e} s ({reason})"
    )]
    ConvergenceFailure {
        time: f64,
        dt: f64,
        failures: usize,
        reason: String,
    },

    /// API contract violation, e.g. querying the coupling manager before
    /// `initialize`. Always a programming error, never retried.
    #[error("state error: {0}")]
    State(String),

    /// Failure writing output files.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulatorError {
    /// Whether the time-stepping retry path may absorb this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SimulatorError::Assembly { .. }
                | SimulatorError::LinearSolve(_)
                | SimulatorError::ConvergenceFailure { .. }
        )
    }

    /// Exit code the driver reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimulatorError::Configuration(_) => exit_code::CONFIGURATION,
            SimulatorError::Mesh(_) => exit_code::MESH,
            SimulatorError::Initialization(_)
            | SimulatorError::Assembly { .. }
            | SimulatorError::LinearSolve(_)
            | SimulatorError::ConvergenceFailure { .. }
            | SimulatorError::State(_)
            | SimulatorError::Io(_) => exit_code::FRAMEWORK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(
            SimulatorError::Configuration("bad".into()).exit_code(),
            exit_code::CONFIGURATION
        );
        assert_eq!(SimulatorError::Mesh("bad".into()).exit_code(), exit_code::MESH);
        assert_eq!(
            SimulatorError::LinearSolve("singular".into()).exit_code(),
            exit_code::FRAMEWORK
        );
        assert_eq!(
            SimulatorError::State("not initialized".into()).exit_code(),
            exit_code::FRAMEWORK
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(SimulatorError::Assembly {
            domain: "flow",
            dof: 3,
            quantity: "residual",
        }
        .is_recoverable());
        assert!(SimulatorError::LinearSolve("breakdown".into()).is_recoverable());
        assert!(SimulatorError::ConvergenceFailure {
            time: 0.0,
            dt: 1.0,
            failures: 4,
            reason: "max iterations".into(),
        }
        .is_recoverable());

        assert!(!SimulatorError::Configuration("bad".into()).is_recoverable());
        assert!(!SimulatorError::State("misuse".into()).is_recoverable());
    }

    #[test]
    fn test_display_names_offending_dof() {
        let e = SimulatorError::Assembly {
            domain: "mechanics",
            dof: 7,
            quantity: "residual",
        };
        let msg = format!("{}", e);
        assert!(msg.contains("mechanics"));
        assert!(msg.contains("dof 7"));
    }
}
