//! Single-phase flow kernel
//!
//! Cell-centered two-point flux discretization of slightly compressible
//! Darcy flow along the column. Each cell balances mass (kg/s): a storage
//! rate built from the coupling-supplied porosity, internal face fluxes
//! with harmonic permeability means and upwind density, and a drainage
//! flux through the top boundary held at the configured gauge pressure.
//! The base of the column is a no-flow boundary.

use crate::config::FluidConfig;
use crate::domain::{Subdomain, SubdomainId};
use crate::grid::ColumnGrid;
use crate::physics::traits::{KernelView, ResidualKernel};

#[derive(Debug, Clone)]
pub struct FlowKernel {
    grid: ColumnGrid,
    fluid: FluidConfig,
}

impl FlowKernel {
    pub fn new(grid: &ColumnGrid, fluid: &FluidConfig) -> Self {
        FlowKernel {
            grid: grid.clone(),
            fluid: fluid.clone(),
        }
    }

    /// Linearized equation of state around the reference pressure.
    pub fn density(&self, pressure: f64) -> f64 {
        self.fluid.density
            * (1.0 + self.fluid.compressibility * (pressure - self.fluid.reference_pressure))
    }

    /// Fluid mass held in one cell, for the mass-balance diagnostic.
    pub fn cell_fluid_mass(&self, porosity: f64, pressure: f64) -> f64 {
        porosity * self.density(pressure) * self.grid.cell_volume()
    }

    /// Mass flux (kg/s) from `lower` into `upper` across their shared
    /// face, positive in the upward direction.
    fn internal_flux(&self, lower: usize, upper: usize, view: &KernelView) -> f64 {
        let p = view.own_new;
        let k_lo = view.coupling.permeability(lower);
        let k_up = view.coupling.permeability(upper);
        let k_face = 2.0 * k_lo * k_up / (k_lo + k_up);
        let trans = k_face * self.grid.face_area() / (self.fluid.viscosity * self.grid.dz());

        let dp = p[lower] - p[upper];
        let rho = if dp >= 0.0 {
            self.density(p[lower])
        } else {
            self.density(p[upper])
        };
        rho * trans * dp
    }

    /// Mass flux (kg/s) out of the top cell through the drained surface.
    /// Half-cell transmissibility, boundary pressure fixed.
    fn drainage_flux(&self, top: usize, view: &KernelView) -> f64 {
        let p = view.own_new[top];
        let k = view.coupling.permeability(top);
        let trans = k * self.grid.face_area() / (self.fluid.viscosity * 0.5 * self.grid.dz());

        let dp = p - self.fluid.drainage_pressure;
        let rho = if dp >= 0.0 {
            self.density(p)
        } else {
            self.density(self.fluid.drainage_pressure)
        };
        rho * trans * dp
    }
}

impl ResidualKernel for FlowKernel {
    fn subdomain(&self) -> Subdomain {
        Subdomain::new(SubdomainId::Flow, "pressure", self.grid.n_cells())
    }

    fn num_dofs(&self) -> usize {
        self.grid.n_cells()
    }

    fn residual_entry(&self, cell: usize, view: &KernelView) -> f64 {
        let n = self.grid.n_cells();
        let p_new = view.own_new[cell];
        let p_old = view.own_old[cell];

        let mass_new = view.coupling.porosity(cell) * self.density(p_new);
        let mass_old = view.coupling.previous_porosity(cell) * self.density(p_old);
        let mut residual = (mass_new - mass_old) * self.grid.cell_volume() / view.dt;

        // Flux entering through the lower face, leaving through the upper
        if cell > 0 {
            residual -= self.internal_flux(cell - 1, cell, view);
        }
        if cell + 1 < n {
            residual += self.internal_flux(cell, cell + 1, view);
        } else {
            residual += self.drainage_flux(cell, view);
        }
        residual
    }

    fn connectivity(&self, cell: usize) -> Vec<usize> {
        let n = self.grid.n_cells();
        let mut rows = Vec::with_capacity(3);
        if cell > 0 {
            rows.push(cell - 1);
        }
        rows.push(cell);
        if cell + 1 < n {
            rows.push(cell + 1);
        }
        rows
    }

    fn initial_value(&self, _cell: usize) -> f64 {
        self.fluid.initial_pressure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CouplingConfig, SolidConfig};
    use crate::coupling::CouplingManager;
    use crate::domain::{PerDomain, SolutionState};
    use approx::assert_relative_eq;

    fn fluid() -> FluidConfig {
        FluidConfig {
            density: 1000.0,
            viscosity: 1.0e-3,
            compressibility: 0.0,
            reference_pressure: 0.0,
            initial_pressure: 0.0,
            drainage_pressure: 0.0,
        }
    }

    fn setup(n_cells: usize) -> (ColumnGrid, CouplingManager, SolutionState) {
        let grid = ColumnGrid::new(n_cells, 1.0, 1.0).unwrap();
        let coupling = CouplingConfig::default();
        let solid = SolidConfig {
            permeability: 1.0e-12,
            ..SolidConfig::default()
        };
        let mut manager = CouplingManager::new(&grid, &coupling, &solid);
        let solution = SolutionState::zeros(PerDomain::new(n_cells, n_cells + 1));
        let flow = Subdomain::new(SubdomainId::Flow, "pressure", n_cells);
        let mech = Subdomain::new(SubdomainId::Mechanics, "displacement", n_cells + 1);
        manager.initialize(&flow, &mech, &solution).unwrap();
        (grid, manager, solution)
    }

    #[test]
    fn test_uniform_equilibrium_has_zero_residual() {
        let (grid, manager, solution) = setup(4);
        let kernel = FlowKernel::new(&grid, &fluid());
        let view = KernelView {
            own_new: solution.slice(SubdomainId::Flow),
            own_old: solution.slice(SubdomainId::Flow),
            dt: 10.0,
            coupling: &manager,
        };
        for cell in 0..4 {
            assert_relative_eq!(kernel.residual_entry(cell, &view), 0.0);
        }
    }

    #[test]
    fn test_interior_residuals_telescope() {
        // With incompressible fluid and frozen porosity, the sum of all
        // cell residuals must equal the drainage outflow alone: internal
        // fluxes cancel pairwise.
        let (grid, manager, _) = setup(4);
        let kernel = FlowKernel::new(&grid, &fluid());
        let p = vec![4.0e4, 3.0e4, 2.0e4, 1.0e4];
        let view = KernelView {
            own_new: &p,
            own_old: &p,
            dt: 10.0,
            coupling: &manager,
        };
        let total: f64 = (0..4).map(|c| kernel.residual_entry(c, &view)).sum();

        let trans_half = 1.0e-12 * 1.0 / (1.0e-3 * 0.125);
        let expected_drainage = 1000.0 * trans_half * 1.0e4;
        assert_relative_eq!(total, expected_drainage, max_relative = 1.0e-12);
    }

    #[test]
    fn test_internal_flux_matches_darcy() {
        let (grid, manager, _) = setup(2);
        let kernel = FlowKernel::new(&grid, &fluid());
        let p = vec![2.0e4, 1.0e4];
        let old = vec![2.0e4, 1.0e4];
        let view = KernelView {
            own_new: &p,
            own_old: &old,
            dt: 1.0e9, // storage negligible
            coupling: &manager,
        };
        // dz = 0.5, k = 1e-12, mu = 1e-3: T = k A / (mu dz) = 2e-9
        let flux = 1000.0 * 2.0e-9 * 1.0e4;
        // Cell 0: outflow through its upper face
        let r0 = kernel.residual_entry(0, &view);
        assert_relative_eq!(r0, flux, max_relative = 1.0e-9);
    }

    #[test]
    fn test_bottom_cell_has_no_basal_flux() {
        let (grid, manager, _) = setup(3);
        let kernel = FlowKernel::new(&grid, &fluid());
        // Uniform pressure: every face flux vanishes, including at the
        // base; only the top cell drains.
        let p = vec![5.0e3; 3];
        let view = KernelView {
            own_new: &p,
            own_old: &p,
            dt: 1.0e9,
            coupling: &manager,
        };
        assert_relative_eq!(kernel.residual_entry(0, &view), 0.0);
        assert_relative_eq!(kernel.residual_entry(1, &view), 0.0);
        assert!(kernel.residual_entry(2, &view) > 0.0);
    }

    #[test]
    fn test_connectivity_is_tridiagonal() {
        let grid = ColumnGrid::new(5, 1.0, 1.0).unwrap();
        let kernel = FlowKernel::new(&grid, &fluid());
        assert_eq!(kernel.connectivity(0), vec![0, 1]);
        assert_eq!(kernel.connectivity(2), vec![1, 2, 3]);
        assert_eq!(kernel.connectivity(4), vec![3, 4]);
    }

    #[test]
    fn test_density_law() {
        let grid = ColumnGrid::new(2, 1.0, 1.0).unwrap();
        let mut f = fluid();
        f.compressibility = 1.0e-9;
        let kernel = FlowKernel::new(&grid, &f);
        assert_relative_eq!(kernel.density(0.0), 1000.0);
        assert_relative_eq!(kernel.density(1.0e6), 1001.0);
    }
}
