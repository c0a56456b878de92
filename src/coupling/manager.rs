//! Bidirectional coupling manager
//!
//! Mediates every piece of information that crosses the flow/mechanics
//! boundary. Each subdomain's residual needs quantities derived from the
//! *partner's* solution: the flow storage and flux terms need porosity and
//! permeability (functions of volumetric strain), the mechanics stress
//! needs the Biot pore-pressure term. The manager caches those derived
//! values per dof and keeps the caches consistent with the solution
//! through an explicit invalidation protocol:
//!
//! - full solution updates (a Newton step) are detected by the solution
//!   version tag and trigger a full recompute on the next `refresh`;
//! - single-dof perturbations during Jacobian probing are announced with
//!   `mark_dirty`, so `refresh` recomputes only the dependent entries.
//!
//! Time-history coupling (the porosity rate in the storage term) reads a
//! committed "previous" porosity that only `advance_time_step` replaces,
//! so failed Newton attempts never contaminate accepted history.

use std::collections::HashSet;

use crate::config::{CouplingConfig, SolidConfig};
use crate::coupling::stencil::CouplingStencil;
use crate::domain::{PerDomain, SolutionState, Subdomain, SubdomainId};
use crate::error::{Result, SimulatorError};
use crate::grid::ColumnGrid;
use crate::physics::porosity::{KozenyCarman, PorosityLaw};

/// One subdomain's cache of partner-derived quantities.
#[derive(Debug, Clone)]
struct ContextCache {
    /// Primary derived quantity per dof: effective porosity for the flow
    /// side, Biot pore-pressure term for the mechanics side.
    primary: Vec<f64>,
    /// Secondary quantity, only used on the flow side (permeability).
    secondary: Vec<f64>,
    /// Entries announced stale via `mark_dirty`.
    dirty: HashSet<usize>,
    /// Whether any mutation since the last refresh was announced.
    announced: bool,
    /// Solution version the cache was last refreshed against.
    version: u64,
}

impl ContextCache {
    fn new(len: usize) -> Self {
        ContextCache {
            primary: vec![0.0; len],
            secondary: vec![0.0; len],
            dirty: HashSet::new(),
            announced: false,
            version: 0,
        }
    }

    fn clean(&self) -> bool {
        self.dirty.is_empty() && !self.announced
    }
}

/// State created by `initialize` and owned until the manager is dropped.
#[derive(Debug, Clone)]
struct Bound {
    descriptors: PerDomain<Subdomain>,
    /// `stencils[d]` maps a dof of subdomain d to partner residual rows.
    stencils: PerDomain<CouplingStencil>,
    /// `contexts[d]` caches what subdomain d's residual reads from the
    /// partner solution.
    contexts: PerDomain<ContextCache>,
    /// Porosity of the last accepted step, per cell. Read by the flow
    /// storage rate term.
    previous_porosity: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct CouplingManager {
    grid: ColumnGrid,
    biot: f64,
    porosity_law: PorosityLaw,
    permeability_law: KozenyCarman,
    bound: Option<Bound>,
}

impl CouplingManager {
    pub fn new(grid: &ColumnGrid, coupling: &CouplingConfig, solid: &SolidConfig) -> Self {
        CouplingManager {
            grid: grid.clone(),
            biot: coupling.biot_coefficient,
            porosity_law: PorosityLaw::new(solid.porosity, coupling.strain_feedback),
            permeability_law: KozenyCarman::new(
                solid.permeability,
                solid.porosity,
                coupling.permeability_from_porosity,
            ),
            bound: None,
        }
    }

    /// Bind the two subdomains, build both stencils, and derive the
    /// initial coupling context and previous-step commit from the initial
    /// solution.
    pub fn initialize(
        &mut self,
        a: &Subdomain,
        b: &Subdomain,
        initial: &SolutionState,
    ) -> Result<()> {
        if a.id == b.id {
            return Err(SimulatorError::Initialization(format!(
                "both subdomains carry the id {:?}",
                a.id
            )));
        }
        let mut descriptors = PerDomain::new(a.clone(), b.clone());
        if descriptors[SubdomainId::Flow].id != SubdomainId::Flow {
            descriptors = PerDomain::new(b.clone(), a.clone());
        }

        for id in SubdomainId::ALL {
            let d = &descriptors[id];
            if d.num_dofs == 0 {
                return Err(SimulatorError::Initialization(format!(
                    "{} subdomain has no degrees of freedom",
                    id.name()
                )));
            }
            if initial.len(id) != d.num_dofs {
                return Err(SimulatorError::Initialization(format!(
                    "{} subdomain declares {} dofs but the initial solution carries {}",
                    id.name(),
                    d.num_dofs,
                    initial.len(id)
                )));
            }
        }
        if descriptors[SubdomainId::Flow].num_dofs != self.grid.n_cells()
            || descriptors[SubdomainId::Mechanics].num_dofs != self.grid.n_vertices()
        {
            return Err(SimulatorError::Initialization(format!(
                "subdomain dof counts ({} flow, {} mechanics) do not match the grid \
                 ({} cells, {} vertices)",
                descriptors[SubdomainId::Flow].num_dofs,
                descriptors[SubdomainId::Mechanics].num_dofs,
                self.grid.n_cells(),
                self.grid.n_vertices()
            )));
        }

        let stencils = PerDomain::new(
            CouplingStencil::flow_to_mechanics(&self.grid, self.biot > 0.0),
            CouplingStencil::mechanics_to_flow(
                &self.grid,
                self.porosity_law.is_active(),
                self.porosity_law.is_active() && self.permeability_law.is_active(),
            ),
        );

        let contexts = PerDomain::new(
            ContextCache::new(self.grid.n_cells()),
            ContextCache::new(self.grid.n_cells()),
        );

        self.bound = Some(Bound {
            descriptors,
            stencils,
            contexts,
            previous_porosity: vec![self.porosity_law.reference(); self.grid.n_cells()],
        });

        self.recompute_all(initial);
        let bound = self.bound_mut();
        for id in SubdomainId::ALL {
            bound.contexts[id].version = initial.version();
        }
        self.commit_previous(initial);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }

    pub fn subdomain(&self, id: SubdomainId) -> &Subdomain {
        &self.bound().descriptors[id]
    }

    /// Partner residual rows that may depend on `dof` of subdomain
    /// `owner`. Pure query.
    pub fn coupling_stencil(&self, owner: SubdomainId, dof: usize) -> &[usize] {
        self.bound().stencils[owner].get(dof)
    }

    /// Recompute one derived quantity from a partner solution slice,
    /// bypassing the cache. Deterministic: the cached values are produced
    /// by this same function, so cache hits and recomputations can never
    /// disagree.
    ///
    /// For `owner == Flow` the quantity is the effective porosity of cell
    /// `dof` derived from the displacement slice; for `owner ==
    /// Mechanics` it is the Biot pore-pressure term of element `dof`
    /// derived from the pressure slice.
    pub fn eval_coupling_quantity(
        &self,
        owner: SubdomainId,
        dof: usize,
        partner_solution: &[f64],
    ) -> f64 {
        match owner {
            SubdomainId::Flow => {
                let strain =
                    (partner_solution[dof + 1] - partner_solution[dof]) / self.grid.dz();
                self.porosity_law.porosity(strain)
            }
            SubdomainId::Mechanics => self.biot * partner_solution[dof],
        }
    }

    /// Announce that `dof` of subdomain `owner` changed. Marks the
    /// partner-context entries deriving from it stale; nothing is
    /// recomputed until `refresh`.
    pub fn mark_dirty(&mut self, owner: SubdomainId, dof: usize) -> Result<()> {
        let grid_cells = self.grid.n_cells();
        let bound = self
            .bound
            .as_mut()
            .ok_or_else(|| SimulatorError::State("mark_dirty before initialize".into()))?;

        let ctx = &mut bound.contexts[owner.partner()];
        match owner {
            // Pressure p[dof] feeds the pore-pressure term of element dof.
            SubdomainId::Flow => {
                ctx.dirty.insert(dof);
            }
            // Displacement u[dof] strains the elements left and right of
            // the vertex; their porosity and permeability entries derive
            // from it.
            SubdomainId::Mechanics => {
                if dof > 0 {
                    ctx.dirty.insert(dof - 1);
                }
                if dof < grid_cells {
                    ctx.dirty.insert(dof);
                }
            }
        }
        ctx.announced = true;
        Ok(())
    }

    /// Bring subdomain `owner`'s context up to date with `solution`.
    ///
    /// Announced single-dof changes are recomputed entry-by-entry; an
    /// unannounced version change (a full Newton update) falls back to a
    /// full recompute.
    pub fn refresh(&mut self, owner: SubdomainId, solution: &SolutionState) -> Result<()> {
        if self.bound.is_none() {
            return Err(SimulatorError::State("refresh before initialize".into()));
        }

        let version = solution.version();
        let partner = owner.partner();
        let (announced, up_to_date) = {
            let ctx = &self.bound().contexts[owner];
            (ctx.announced, ctx.version == version && ctx.clean())
        };
        if up_to_date {
            return Ok(());
        }

        if announced {
            let dirty: Vec<usize> = {
                let ctx = &mut self.bound_mut().contexts[owner];
                ctx.dirty.drain().collect()
            };
            let partner_slice = solution.slice(partner);
            for dof in dirty {
                self.recompute_entry(owner, dof, partner_slice);
            }
        } else {
            self.recompute_context(owner, solution.slice(partner));
        }

        let ctx = &mut self.bound_mut().contexts[owner];
        ctx.dirty.clear();
        ctx.announced = false;
        ctx.version = version;
        Ok(())
    }

    /// Commit an accepted solution as the reference for time-derivative
    /// coupling terms and synchronize both contexts with it.
    pub fn advance_time_step(&mut self, accepted: &SolutionState) -> Result<()> {
        if self.bound.is_none() {
            return Err(SimulatorError::State(
                "advance_time_step before initialize".into(),
            ));
        }
        self.recompute_all(accepted);
        {
            let version = accepted.version();
            let bound = self.bound_mut();
            for id in SubdomainId::ALL {
                let ctx = &mut bound.contexts[id];
                ctx.dirty.clear();
                ctx.announced = false;
                ctx.version = version;
            }
        }
        self.commit_previous(accepted);
        Ok(())
    }

    /// Effective porosity of `cell` at the current Newton iterate.
    pub fn porosity(&self, cell: usize) -> f64 {
        let ctx = &self.bound().contexts[SubdomainId::Flow];
        debug_assert!(ctx.clean(), "porosity read from a stale coupling context");
        ctx.primary[cell]
    }

    /// Porosity of `cell` at the last accepted step.
    pub fn previous_porosity(&self, cell: usize) -> f64 {
        self.bound().previous_porosity[cell]
    }

    /// Permeability of `cell` at the current Newton iterate.
    pub fn permeability(&self, cell: usize) -> f64 {
        let ctx = &self.bound().contexts[SubdomainId::Flow];
        debug_assert!(ctx.clean(), "permeability read from a stale coupling context");
        ctx.secondary[cell]
    }

    /// Biot pore-pressure term of `element` at the current Newton iterate.
    pub fn pore_pressure_term(&self, element: usize) -> f64 {
        let ctx = &self.bound().contexts[SubdomainId::Mechanics];
        debug_assert!(
            ctx.clean(),
            "pore pressure read from a stale coupling context"
        );
        ctx.primary[element]
    }

    pub fn biot_coefficient(&self) -> f64 {
        self.biot
    }

    fn bound(&self) -> &Bound {
        match &self.bound {
            Some(b) => b,
            None => panic!("coupling manager used before initialize"),
        }
    }

    fn bound_mut(&mut self) -> &mut Bound {
        match &mut self.bound {
            Some(b) => b,
            None => panic!("coupling manager used before initialize"),
        }
    }

    fn recompute_entry(&mut self, owner: SubdomainId, dof: usize, partner_slice: &[f64]) {
        let primary = self.eval_coupling_quantity(owner, dof, partner_slice);
        let secondary = match owner {
            SubdomainId::Flow => self.permeability_law.permeability(primary),
            SubdomainId::Mechanics => 0.0,
        };
        let ctx = &mut self.bound_mut().contexts[owner];
        ctx.primary[dof] = primary;
        ctx.secondary[dof] = secondary;
    }

    fn recompute_context(&mut self, owner: SubdomainId, partner_slice: &[f64]) {
        for dof in 0..self.grid.n_cells() {
            self.recompute_entry(owner, dof, partner_slice);
        }
    }

    fn recompute_all(&mut self, solution: &SolutionState) {
        self.recompute_context(SubdomainId::Flow, solution.slice(SubdomainId::Mechanics));
        self.recompute_context(SubdomainId::Mechanics, solution.slice(SubdomainId::Flow));
    }

    fn commit_previous(&mut self, accepted: &SolutionState) {
        for cell in 0..self.grid.n_cells() {
            let phi = self.eval_coupling_quantity(
                SubdomainId::Flow,
                cell,
                accepted.slice(SubdomainId::Mechanics),
            );
            self.bound_mut().previous_porosity[cell] = phi;
        }
    }
}
