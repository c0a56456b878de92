//! Cross-domain dependency stencils
//!
//! A coupling stencil answers one question: if this dof changes, which
//! partner-domain residual rows can change with it? The assembler uses
//! the answer to limit numeric-differentiation probes to the rows that
//! can actually move, which keeps Jacobian assembly proportional to
//! stencil size instead of total dof count.
//!
//! The stencils are wider than geometric overlap. A displacement vertex
//! reaches not just the cells it bounds (their porosity holds strain) but
//! also, when permeability tracks porosity, the flux neighbors of those
//! cells, because a harmonic face permeability mixes both sides.

use crate::grid::ColumnGrid;

#[derive(Debug, Clone)]
pub struct CouplingStencil {
    rows: Vec<Vec<usize>>,
}

impl CouplingStencil {
    /// Partner residual rows depending on `dof`. Sorted, duplicate-free.
    pub fn get(&self, dof: usize) -> &[usize] {
        &self.rows[dof]
    }

    pub fn num_dofs(&self) -> usize {
        self.rows.len()
    }

    /// Total stored entries, mainly for diagnostics.
    pub fn num_entries(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    /// Stencil of a flow cell dof into mechanics rows.
    ///
    /// Cell pressure enters the total stress of its own element, so it
    /// reaches the element's two vertices. Vertex 0 is pinned by an
    /// identity row and never depends on pressure. With a zero Biot
    /// coefficient the pressure never reaches mechanics at all.
    pub fn flow_to_mechanics(grid: &ColumnGrid, biot_active: bool) -> Self {
        let n_cells = grid.n_cells();
        let rows = (0..n_cells)
            .map(|cell| {
                if !biot_active {
                    return Vec::new();
                }
                let mut rows: Vec<usize> = vec![cell, cell + 1];
                rows.retain(|&j| j != 0);
                rows
            })
            .collect();
        CouplingStencil { rows }
    }

    /// Stencil of a mechanics vertex dof into flow rows.
    ///
    /// Vertex displacement strains the adjacent elements, moving the
    /// porosity of the matching cells (their storage terms). If
    /// permeability follows porosity, the fluxes of those cells' faces
    /// move too, pulling in one more cell on each side.
    pub fn mechanics_to_flow(
        grid: &ColumnGrid,
        porosity_active: bool,
        permeability_active: bool,
    ) -> Self {
        let n_cells = grid.n_cells();
        let rows = (0..grid.n_vertices())
            .map(|vertex| {
                if !porosity_active {
                    return Vec::new();
                }
                let reach = if permeability_active { 2 } else { 1 };
                let lo = vertex.saturating_sub(reach);
                let hi = (vertex + reach).min(n_cells);
                // Cells [vertex - reach, vertex + reach - 1] clipped to the column
                (lo..hi).collect()
            })
            .collect();
        CouplingStencil { rows }
    }
}
