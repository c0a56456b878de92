//! Coupled residual and Jacobian assembly
//!
//! The assembler owns the two discretization kernels and wires them
//! together through the coupling manager. Residual assembly is a full
//! pass over both subdomains with the per-entry work parallelized;
//! Jacobian assembly is numeric differentiation, one column at a time:
//! perturb a dof, re-evaluate only the residual rows that can feel the
//! perturbation (own-domain rows from the kernel connectivity, partner
//! rows from the coupling stencil), difference against the base residual
//! and restore the exact original value. The coupling manager's
//! mark_dirty/refresh protocol keeps the cached cross-domain quantities
//! in step with each perturbation, so per-column cost is bounded by
//! stencil size rather than total dof count.

use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use crate::coupling::CouplingManager;
use crate::domain::{PerDomain, SolutionState, Subdomain, SubdomainId};
use crate::error::{Result, SimulatorError};
use crate::physics::traits::{KernelView, ResidualKernel};
use crate::physics::{FlowKernel, MechanicsKernel};

/// Relative finite-difference perturbation scale.
const EPSILON_BASE: f64 = 1.0e-8;

/// Coupled Jacobian in four sparse blocks, row and column domains
/// indexed separately. Off-diagonal blocks hold entries only for dof
/// pairs listed in the coupling stencils; everything else is structurally
/// zero.
#[derive(Debug)]
pub struct BlockJacobian {
    n_flow: usize,
    n_mechanics: usize,
    ff: CsMat<f64>,
    fm: CsMat<f64>,
    mf: CsMat<f64>,
    mm: CsMat<f64>,
}

impl BlockJacobian {
    pub fn block(&self, row: SubdomainId, col: SubdomainId) -> &CsMat<f64> {
        match (row, col) {
            (SubdomainId::Flow, SubdomainId::Flow) => &self.ff,
            (SubdomainId::Flow, SubdomainId::Mechanics) => &self.fm,
            (SubdomainId::Mechanics, SubdomainId::Flow) => &self.mf,
            (SubdomainId::Mechanics, SubdomainId::Mechanics) => &self.mm,
        }
    }

    pub fn total_dofs(&self) -> usize {
        self.n_flow + self.n_mechanics
    }

    /// Flatten the four blocks into one global CSR matrix using the
    /// flow-first dof ordering shared with [`SolutionState`].
    pub fn flatten(&self) -> CsMat<f64> {
        let n = self.total_dofs();
        let mut tri = TriMat::new((n, n));
        for (&v, (r, c)) in self.ff.iter() {
            tri.add_triplet(r, c, v);
        }
        for (&v, (r, c)) in self.fm.iter() {
            tri.add_triplet(r, self.n_flow + c, v);
        }
        for (&v, (r, c)) in self.mf.iter() {
            tri.add_triplet(self.n_flow + r, c, v);
        }
        for (&v, (r, c)) in self.mm.iter() {
            tri.add_triplet(self.n_flow + r, self.n_flow + c, v);
        }
        tri.to_csr()
    }
}

pub struct Assembler {
    flow: FlowKernel,
    mechanics: MechanicsKernel,
}

impl Assembler {
    pub fn new(flow: FlowKernel, mechanics: MechanicsKernel) -> Self {
        Assembler { flow, mechanics }
    }

    fn kernel(&self, id: SubdomainId) -> &dyn ResidualKernel {
        match id {
            SubdomainId::Flow => &self.flow,
            SubdomainId::Mechanics => &self.mechanics,
        }
    }

    pub fn flow_kernel(&self) -> &FlowKernel {
        &self.flow
    }

    pub fn mechanics_kernel(&self) -> &MechanicsKernel {
        &self.mechanics
    }

    pub fn subdomains(&self) -> PerDomain<Subdomain> {
        PerDomain::from_fn(|id| self.kernel(id).subdomain())
    }

    /// Write each kernel's initial field into the solution.
    pub fn apply_initial_solution(&self, state: &mut SolutionState) {
        for id in SubdomainId::ALL {
            let kernel = self.kernel(id);
            for dof in 0..kernel.num_dofs() {
                state.set_dof(id, dof, kernel.initial_value(dof));
            }
        }
    }

    /// Evaluate both subdomain residuals at `new`, refreshing the
    /// coupling context first. Fails with a recoverable assembly error on
    /// any non-finite entry.
    pub fn assemble_residual(
        &self,
        new: &SolutionState,
        old: &SolutionState,
        dt: f64,
        manager: &mut CouplingManager,
    ) -> Result<PerDomain<Vec<f64>>> {
        manager.refresh(SubdomainId::Flow, new)?;
        manager.refresh(SubdomainId::Mechanics, new)?;

        let mut residuals = PerDomain::new(Vec::new(), Vec::new());
        for id in SubdomainId::ALL {
            let kernel = self.kernel(id);
            let view = KernelView {
                own_new: new.slice(id),
                own_old: old.slice(id),
                dt,
                coupling: manager,
            };
            let entries: Vec<f64> = (0..kernel.num_dofs())
                .into_par_iter()
                .map(|dof| kernel.residual_entry(dof, &view))
                .collect();
            for (dof, value) in entries.iter().enumerate() {
                if !value.is_finite() {
                    return Err(SimulatorError::Assembly {
                        domain: id.name(),
                        dof,
                        quantity: "residual",
                    });
                }
            }
            residuals[id] = entries;
        }
        Ok(residuals)
    }

    /// Assemble the block Jacobian at `new` by numeric differentiation.
    ///
    /// The solution is perturbed dof by dof and restored bit-exactly
    /// after every probe; on return `new` equals its value on entry and
    /// the coupling context matches it.
    pub fn assemble_jacobian(
        &self,
        new: &mut SolutionState,
        old: &SolutionState,
        dt: f64,
        manager: &mut CouplingManager,
    ) -> Result<BlockJacobian> {
        let base = self.assemble_residual(new, old, dt, manager)?;
        let n_flow = self.flow.num_dofs();
        let n_mechanics = self.mechanics.num_dofs();

        let mut t_ff = TriMat::new((n_flow, n_flow));
        let mut t_fm = TriMat::new((n_flow, n_mechanics));
        let mut t_mf = TriMat::new((n_mechanics, n_flow));
        let mut t_mm = TriMat::new((n_mechanics, n_mechanics));

        for col_domain in SubdomainId::ALL {
            let partner = col_domain.partner();
            let kernel = self.kernel(col_domain);
            let partner_kernel = self.kernel(partner);

            for col in 0..kernel.num_dofs() {
                let own_rows = kernel.connectivity(col);
                let partner_rows = manager.coupling_stencil(col_domain, col).to_vec();

                let original = new.dof(col_domain, col);
                let eps = EPSILON_BASE * (1.0 + original.abs());

                new.set_dof(col_domain, col, original + eps);
                manager.mark_dirty(col_domain, col)?;
                manager.refresh(partner, new)?;

                let (tri_own, tri_partner) = match col_domain {
                    SubdomainId::Flow => (&mut t_ff, &mut t_mf),
                    SubdomainId::Mechanics => (&mut t_mm, &mut t_fm),
                };
                let mut probe_error = None;
                {
                    let own_view = KernelView {
                        own_new: new.slice(col_domain),
                        own_old: old.slice(col_domain),
                        dt,
                        coupling: manager,
                    };
                    if let Err(e) = probe_rows(
                        kernel,
                        &own_rows,
                        &own_view,
                        &base[col_domain],
                        eps,
                        col,
                        tri_own,
                        col_domain,
                    ) {
                        probe_error = Some(e);
                    }
                }
                if probe_error.is_none() {
                    let partner_view = KernelView {
                        own_new: new.slice(partner),
                        own_old: old.slice(partner),
                        dt,
                        coupling: manager,
                    };
                    if let Err(e) = probe_rows(
                        partner_kernel,
                        &partner_rows,
                        &partner_view,
                        &base[partner],
                        eps,
                        col,
                        tri_partner,
                        partner,
                    ) {
                        probe_error = Some(e);
                    }
                }

                // Undo the probe before anything can observe it, error or
                // not: write back the exact original bits and bring the
                // partner context back in line.
                new.set_dof(col_domain, col, original);
                manager.mark_dirty(col_domain, col)?;
                manager.refresh(partner, new)?;

                if let Some(e) = probe_error {
                    return Err(e);
                }
            }
        }

        Ok(BlockJacobian {
            n_flow,
            n_mechanics,
            ff: t_ff.to_csr(),
            fm: t_fm.to_csr(),
            mf: t_mf.to_csr(),
            mm: t_mm.to_csr(),
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn probe_rows(
    kernel: &dyn ResidualKernel,
    rows: &[usize],
    view: &KernelView,
    base: &[f64],
    eps: f64,
    col: usize,
    tri: &mut TriMat<f64>,
    domain: SubdomainId,
) -> Result<()> {
    for &row in rows {
        let perturbed = kernel.residual_entry(row, view);
        if !perturbed.is_finite() {
            return Err(SimulatorError::Assembly {
                domain: domain.name(),
                dof: row,
                quantity: "jacobian",
            });
        }
        tri.add_triplet(row, col, (perturbed - base[row]) / eps);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::grid::ColumnGrid;
    use approx::assert_relative_eq;

    fn two_cell_setup() -> (SimulationConfig, ColumnGrid, Assembler, CouplingManager) {
        let mut config = SimulationConfig::default();
        config.grid.n_cells = 2;
        config.grid.height = 1.0;
        config.fluid.compressibility = 0.0;
        let grid = ColumnGrid::new(config.grid.n_cells, config.grid.height, config.grid.area)
            .unwrap();
        let assembler = Assembler::new(
            FlowKernel::new(&grid, &config.fluid),
            MechanicsKernel::new(&grid, &config.solid),
        );
        let manager = CouplingManager::new(&grid, &config.coupling, &config.solid);
        (config, grid, assembler, manager)
    }

    fn initialized(
        assembler: &Assembler,
        manager: &mut CouplingManager,
    ) -> (SolutionState, SolutionState) {
        let subs = assembler.subdomains();
        let mut new = SolutionState::zeros(PerDomain::from_fn(|id| subs[id].num_dofs));
        assembler.apply_initial_solution(&mut new);
        let old = new.clone();
        manager
            .initialize(&subs[SubdomainId::Flow], &subs[SubdomainId::Mechanics], &new)
            .unwrap();
        (new, old)
    }

    #[test]
    fn test_jacobian_matches_hand_derivatives() {
        let (_, _, assembler, mut manager) = two_cell_setup();
        let (mut new, old) = initialized(&assembler, &mut manager);

        let jac = assembler
            .assemble_jacobian(&mut new, &old, 10.0, &mut manager)
            .unwrap();

        // Flow block: T = kA/(mu dz) = 2e-9, rho T = 2e-6; top cell adds
        // the half-cell drainage transmissibility 4e-9
        let ff = jac.block(SubdomainId::Flow, SubdomainId::Flow);
        assert_relative_eq!(*ff.get(0, 0).unwrap(), 2.0e-6, max_relative = 1.0e-6);
        assert_relative_eq!(*ff.get(0, 1).unwrap(), -2.0e-6, max_relative = 1.0e-6);
        assert_relative_eq!(*ff.get(1, 1).unwrap(), 6.0e-6, max_relative = 1.0e-6);

        // Storage-strain coupling: rho V/dt * dphi/de / dz = 60
        let fm = jac.block(SubdomainId::Flow, SubdomainId::Mechanics);
        assert_relative_eq!(*fm.get(0, 0).unwrap(), -60.0, max_relative = 1.0e-5);
        assert_relative_eq!(*fm.get(0, 1).unwrap(), 60.0, max_relative = 1.0e-5);
        assert_relative_eq!(*fm.get(1, 2).unwrap(), 60.0, max_relative = 1.0e-5);

        // Pressure-stress coupling: plus/minus the Biot coefficient
        let mf = jac.block(SubdomainId::Mechanics, SubdomainId::Flow);
        assert_relative_eq!(*mf.get(1, 0).unwrap(), -1.0, max_relative = 1.0e-6);
        assert_relative_eq!(*mf.get(1, 1).unwrap(), 1.0, max_relative = 1.0e-6);
        assert_relative_eq!(*mf.get(2, 1).unwrap(), -1.0, max_relative = 1.0e-6);

        // Mechanics block: pin row identity, interior 2 Kc/dz
        let mm = jac.block(SubdomainId::Mechanics, SubdomainId::Mechanics);
        assert_relative_eq!(*mm.get(0, 0).unwrap(), 1.0, max_relative = 1.0e-6);
        assert_relative_eq!(*mm.get(1, 1).unwrap(), 4.8e7, max_relative = 1.0e-6);
        assert_relative_eq!(*mm.get(1, 0).unwrap(), -2.4e7, max_relative = 1.0e-6);
    }

    #[test]
    fn test_pin_row_stays_clean() {
        let (_, _, assembler, mut manager) = two_cell_setup();
        let (mut new, old) = initialized(&assembler, &mut manager);
        let jac = assembler
            .assemble_jacobian(&mut new, &old, 10.0, &mut manager)
            .unwrap();

        // Row 0 of the mechanics blocks is the base pin: only the
        // diagonal unit entry exists
        let mm = jac.block(SubdomainId::Mechanics, SubdomainId::Mechanics);
        assert!(mm.get(0, 1).is_none());
        let mf = jac.block(SubdomainId::Mechanics, SubdomainId::Flow);
        assert!(mf.get(0, 0).is_none());
        assert!(mf.get(0, 1).is_none());
    }

    #[test]
    fn test_decoupled_off_diagonal_blocks_are_empty() {
        let (mut config, grid, _, _) = two_cell_setup();
        config.coupling.strain_feedback = 0.0;
        config.coupling.biot_coefficient = 0.0;
        let assembler = Assembler::new(
            FlowKernel::new(&grid, &config.fluid),
            MechanicsKernel::new(&grid, &config.solid),
        );
        let mut manager = CouplingManager::new(&grid, &config.coupling, &config.solid);
        let (mut new, old) = initialized(&assembler, &mut manager);

        let jac = assembler
            .assemble_jacobian(&mut new, &old, 10.0, &mut manager)
            .unwrap();
        assert_eq!(jac.block(SubdomainId::Flow, SubdomainId::Mechanics).nnz(), 0);
        assert_eq!(jac.block(SubdomainId::Mechanics, SubdomainId::Flow).nnz(), 0);
    }

    #[test]
    fn test_probing_restores_solution_bitwise() {
        let (_, _, assembler, mut manager) = two_cell_setup();
        let (mut new, old) = initialized(&assembler, &mut manager);

        // Evaluate at a state away from equilibrium so every probe
        // actually changes residuals
        new.set_dof(SubdomainId::Flow, 0, 3.0e3);
        new.set_dof(SubdomainId::Mechanics, 2, -1.0e-4);

        let before_flow = new.slice(SubdomainId::Flow).to_vec();
        let before_mech = new.slice(SubdomainId::Mechanics).to_vec();
        assembler
            .assemble_jacobian(&mut new, &old, 10.0, &mut manager)
            .unwrap();

        for (a, b) in before_flow.iter().zip(new.slice(SubdomainId::Flow)) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in before_mech.iter().zip(new.slice(SubdomainId::Mechanics)) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_non_finite_residual_is_recoverable_assembly_error() {
        let (_, _, assembler, mut manager) = two_cell_setup();
        let (mut new, old) = initialized(&assembler, &mut manager);
        new.set_dof(SubdomainId::Flow, 1, f64::NAN);

        let err = assembler
            .assemble_residual(&new, &old, 10.0, &mut manager)
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Assembly { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_flatten_places_blocks_by_offset() {
        let (_, _, assembler, mut manager) = two_cell_setup();
        let (mut new, old) = initialized(&assembler, &mut manager);
        let jac = assembler
            .assemble_jacobian(&mut new, &old, 10.0, &mut manager)
            .unwrap();

        let global = jac.flatten();
        assert_eq!(global.rows(), 5);
        assert_eq!(global.cols(), 5);
        let fm00 = *jac
            .block(SubdomainId::Flow, SubdomainId::Mechanics)
            .get(0, 0)
            .unwrap();
        assert_relative_eq!(*global.get(0, 2).unwrap(), fm00);
        let mf11 = *jac
            .block(SubdomainId::Mechanics, SubdomainId::Flow)
            .get(1, 1)
            .unwrap();
        assert_relative_eq!(*global.get(3, 1).unwrap(), mf11);
    }
}
