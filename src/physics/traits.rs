//! Discretization kernel interface
//!
//! The assembler talks to the two spatial discretizations through
//! [`ResidualKernel`]: one residual entry per dof, plus the own-domain
//! connectivity needed to limit numeric-differentiation probes. Kernels
//! never see each other; anything derived from the partner subdomain
//! arrives through the coupling manager view inside [`KernelView`].

use crate::coupling::CouplingManager;
use crate::domain::Subdomain;

/// Read-only inputs for one residual evaluation.
///
/// `own_new`/`own_old` are the kernel's own solution slices at the current
/// Newton iterate and the last accepted step; cross-domain quantities are
/// read from the coupling manager's caches.
pub struct KernelView<'a> {
    pub own_new: &'a [f64],
    pub own_old: &'a [f64],
    pub dt: f64,
    pub coupling: &'a CouplingManager,
}

pub trait ResidualKernel: Send + Sync {
    /// Descriptor consumed by the coupling manager at initialization.
    fn subdomain(&self) -> Subdomain;

    fn num_dofs(&self) -> usize;

    /// Residual entry for one dof. The assembler checks the returned
    /// value for finiteness; kernels just evaluate.
    fn residual_entry(&self, dof: usize, view: &KernelView) -> f64;

    /// Own-domain rows whose residual entries depend on this dof,
    /// including the dof's own row where applicable. Cross-domain
    /// dependencies are the coupling manager's business, not the
    /// kernel's.
    fn connectivity(&self, dof: usize) -> Vec<usize>;

    /// Initial value of this dof (uniform fields in the column setup).
    fn initial_value(&self, dof: usize) -> f64;
}
