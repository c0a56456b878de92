pub mod assembly;
pub mod config;
pub mod coupling;
pub mod domain;
pub mod error;
pub mod grid;
pub mod linalg;
pub mod newton;
pub mod output;
pub mod physics;
pub mod time_loop;

pub use assembly::{Assembler, BlockJacobian};
pub use config::SimulationConfig;
pub use coupling::{CouplingManager, CouplingStencil};
pub use domain::{PerDomain, SolutionState, Subdomain, SubdomainId};
pub use error::{exit_code, Result, SimulatorError};
pub use grid::ColumnGrid;
pub use linalg::{
    BiCGSTAB, DirectSolver, PreconditionerKind, Solver, solver_from_config, SolverStats,
};
pub use newton::{NewtonAttempt, NewtonSolver, NewtonStepReport};
pub use output::SnapshotWriter;
pub use physics::{
    ElasticModuli, FlowKernel, KernelView, KozenyCarman, MechanicsKernel, PorosityLaw,
    ResidualKernel,
};
pub use time_loop::TimeLoop;
