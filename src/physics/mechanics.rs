//! Poroelastic mechanics kernel
//!
//! Quasi-static 1-D momentum balance on the column vertices, discretized
//! with two-node linear elements. The total stress of an element combines
//! the effective stress from its strain with the coupling-supplied Biot
//! pore-pressure term; a vertex residual is the stress jump between its
//! two adjacent elements. The base vertex is pinned through an identity
//! row, the surface vertex carries the applied compressive load.

use crate::config::SolidConfig;
use crate::domain::{Subdomain, SubdomainId};
use crate::grid::ColumnGrid;
use crate::physics::traits::{KernelView, ResidualKernel};

/// Isotropic linear-elastic moduli with derived Lamé parameters.
#[derive(Debug, Clone, Copy)]
pub struct ElasticModuli {
    youngs: f64,
    poisson: f64,
    lambda: f64,
    shear: f64,
}

impl ElasticModuli {
    /// # Arguments
    /// * `youngs_modulus` - Young's modulus E (Pa), must be positive
    /// * `poisson_ratio` - Poisson ratio ν, must lie in (-1, 0.5)
    pub fn new(youngs_modulus: f64, poisson_ratio: f64) -> Self {
        assert!(youngs_modulus > 0.0, "Young's modulus must be positive");
        assert!(
            poisson_ratio > -1.0 && poisson_ratio < 0.5,
            "Poisson ratio must lie in (-1, 0.5)"
        );
        let lambda = youngs_modulus * poisson_ratio
            / ((1.0 + poisson_ratio) * (1.0 - 2.0 * poisson_ratio));
        let shear = youngs_modulus / (2.0 * (1.0 + poisson_ratio));
        ElasticModuli {
            youngs: youngs_modulus,
            poisson: poisson_ratio,
            lambda,
            shear,
        }
    }

    pub fn youngs_modulus(&self) -> f64 {
        self.youngs
    }

    pub fn poisson_ratio(&self) -> f64 {
        self.poisson
    }

    /// (λ, G)
    pub fn lame_parameters(&self) -> (f64, f64) {
        (self.lambda, self.shear)
    }

    /// Constrained (oedometric) modulus λ + 2G governing uniaxial strain.
    pub fn oedometric_modulus(&self) -> f64 {
        self.lambda + 2.0 * self.shear
    }
}

#[derive(Debug, Clone)]
pub struct MechanicsKernel {
    grid: ColumnGrid,
    moduli: ElasticModuli,
    surface_load: f64,
}

impl MechanicsKernel {
    pub fn new(grid: &ColumnGrid, solid: &SolidConfig) -> Self {
        MechanicsKernel {
            grid: grid.clone(),
            moduli: ElasticModuli::new(solid.youngs_modulus, solid.poisson_ratio),
            surface_load: solid.surface_load,
        }
    }

    pub fn moduli(&self) -> &ElasticModuli {
        &self.moduli
    }

    /// Total axial stress of one element, tension positive.
    fn total_stress(&self, element: usize, view: &KernelView) -> f64 {
        let u = view.own_new;
        let strain = (u[element + 1] - u[element]) / self.grid.dz();
        self.moduli.oedometric_modulus() * strain - view.coupling.pore_pressure_term(element)
    }
}

impl ResidualKernel for MechanicsKernel {
    fn subdomain(&self) -> Subdomain {
        Subdomain::new(SubdomainId::Mechanics, "displacement", self.grid.n_vertices())
    }

    fn num_dofs(&self) -> usize {
        self.grid.n_vertices()
    }

    fn residual_entry(&self, vertex: usize, view: &KernelView) -> f64 {
        let top = self.grid.n_cells();
        let area = self.grid.face_area();

        if vertex == 0 {
            // Pinned base, identity row
            return view.own_new[0];
        }
        if vertex == top {
            // Compressive surface load acts downward on the top vertex
            return area * (self.total_stress(top - 1, view) + self.surface_load);
        }
        area * (self.total_stress(vertex - 1, view) - self.total_stress(vertex, view))
    }

    fn connectivity(&self, vertex: usize) -> Vec<usize> {
        let top = self.grid.n_cells();
        if vertex == 0 {
            // The pin row itself plus the lowest stress row
            return vec![0, 1];
        }
        let mut rows = Vec::with_capacity(3);
        if vertex > 1 {
            rows.push(vertex - 1);
        }
        rows.push(vertex);
        if vertex + 1 <= top {
            rows.push(vertex + 1);
        }
        rows
    }

    fn initial_value(&self, _vertex: usize) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CouplingConfig;
    use crate::coupling::CouplingManager;
    use crate::domain::{PerDomain, SolutionState};
    use approx::assert_relative_eq;

    fn solid() -> SolidConfig {
        SolidConfig {
            youngs_modulus: 1.0e7,
            poisson_ratio: 0.25,
            porosity: 0.4,
            permeability: 1.0e-12,
            surface_load: 1.0e4,
        }
    }

    fn setup(n_cells: usize) -> (ColumnGrid, CouplingManager) {
        let grid = ColumnGrid::new(n_cells, 1.0, 1.0).unwrap();
        let mut manager = CouplingManager::new(&grid, &CouplingConfig::default(), &solid());
        let solution = SolutionState::zeros(PerDomain::new(n_cells, n_cells + 1));
        let flow = Subdomain::new(SubdomainId::Flow, "pressure", n_cells);
        let mech = Subdomain::new(SubdomainId::Mechanics, "displacement", n_cells + 1);
        manager.initialize(&flow, &mech, &solution).unwrap();
        (grid, manager)
    }

    #[test]
    fn test_lame_parameters() {
        let m = ElasticModuli::new(1.0e7, 0.25);
        let (lambda, shear) = m.lame_parameters();
        assert_relative_eq!(lambda, 4.0e6);
        assert_relative_eq!(shear, 4.0e6);
        assert_relative_eq!(m.oedometric_modulus(), 1.2e7);
    }

    #[test]
    #[should_panic(expected = "Poisson ratio")]
    fn test_rejects_incompressible_poisson_ratio() {
        ElasticModuli::new(1.0e7, 0.5);
    }

    #[test]
    fn test_drained_equilibrium_has_zero_residual() {
        let (grid, manager) = setup(4);
        let kernel = MechanicsKernel::new(&grid, &solid());
        let kc = kernel.moduli().oedometric_modulus();

        // Uniform compression e = -load / (lambda + 2G) at zero pressure
        let strain = -1.0e4 / kc;
        let u: Vec<f64> = (0..5).map(|j| strain * grid.vertex_z(j)).collect();
        let old = vec![0.0; 5];
        let view = KernelView {
            own_new: &u,
            own_old: &old,
            dt: 1.0,
            coupling: &manager,
        };
        for vertex in 0..5 {
            assert_relative_eq!(kernel.residual_entry(vertex, &view), 0.0, epsilon = 1.0e-9);
        }
    }

    #[test]
    fn test_unloaded_undeformed_column_feels_only_the_load() {
        let (grid, manager) = setup(2);
        let kernel = MechanicsKernel::new(&grid, &solid());
        let u = vec![0.0; 3];
        let view = KernelView {
            own_new: &u,
            own_old: &u,
            dt: 1.0,
            coupling: &manager,
        };
        // Interior stress jumps vanish, the top vertex carries the load
        assert_relative_eq!(kernel.residual_entry(0, &view), 0.0);
        assert_relative_eq!(kernel.residual_entry(1, &view), 0.0);
        assert_relative_eq!(kernel.residual_entry(2, &view), 1.0e4);
    }

    #[test]
    fn test_pore_pressure_shifts_equilibrium() {
        let n = 3;
        let grid = ColumnGrid::new(n, 1.0, 1.0).unwrap();
        let mut manager = CouplingManager::new(&grid, &CouplingConfig::default(), &solid());
        let mut solution = SolutionState::zeros(PerDomain::new(n, n + 1));
        solution.fill(SubdomainId::Flow, 5.0e3);
        let flow = Subdomain::new(SubdomainId::Flow, "pressure", n);
        let mech = Subdomain::new(SubdomainId::Mechanics, "displacement", n + 1);
        manager.initialize(&flow, &mech, &solution).unwrap();

        let kernel = MechanicsKernel::new(&grid, &solid());
        let kc = kernel.moduli().oedometric_modulus();
        // Equilibrium strain now balances load and pore pressure
        let strain = (5.0e3 - 1.0e4) / kc;
        let u: Vec<f64> = (0..=n).map(|j| strain * grid.vertex_z(j)).collect();
        let old = vec![0.0; n + 1];
        let view = KernelView {
            own_new: &u,
            own_old: &old,
            dt: 1.0,
            coupling: &manager,
        };
        for vertex in 0..=n {
            assert_relative_eq!(kernel.residual_entry(vertex, &view), 0.0, epsilon = 1.0e-9);
        }
    }

    #[test]
    fn test_connectivity_respects_pin_row() {
        let grid = ColumnGrid::new(4, 1.0, 1.0).unwrap();
        let kernel = MechanicsKernel::new(&grid, &solid());
        assert_eq!(kernel.connectivity(0), vec![0, 1]);
        assert_eq!(kernel.connectivity(1), vec![1, 2]);
        assert_eq!(kernel.connectivity(2), vec![1, 2, 3]);
        assert_eq!(kernel.connectivity(4), vec![3, 4]);
    }
}
