//! Uniform 1-D column grid
//!
//! The consolidation column is discretized once, at startup, into `n`
//! equal cells stacked from the impermeable base (z = 0) to the loaded,
//! drained surface (z = height). The flow field lives at cell centers,
//! the displacement field at the `n + 1` cell-boundary vertices, so the
//! two subdomains share geometry but not dof locations.

use crate::error::{Result, SimulatorError};

#[derive(Debug, Clone)]
pub struct ColumnGrid {
    n_cells: usize,
    height: f64,
    area: f64,
    dz: f64,
}

impl ColumnGrid {
    /// Build a uniform column. Fails with a mesh error on degenerate
    /// geometry so bad grids are rejected before any physics is built.
    pub fn new(n_cells: usize, height: f64, area: f64) -> Result<Self> {
        if n_cells == 0 {
            return Err(SimulatorError::Mesh(
                "column grid needs at least one cell".into(),
            ));
        }
        if !height.is_finite() || height <= 0.0 {
            return Err(SimulatorError::Mesh(format!(
                "column height must be positive and finite, got {}",
                height
            )));
        }
        if !area.is_finite() || area <= 0.0 {
            return Err(SimulatorError::Mesh(format!(
                "cross-section area must be positive and finite, got {}",
                area
            )));
        }
        Ok(ColumnGrid {
            n_cells,
            height,
            area,
            dz: height / n_cells as f64,
        })
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Number of mechanics vertices (cell boundaries, including both ends).
    pub fn n_vertices(&self) -> usize {
        self.n_cells + 1
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn dz(&self) -> f64 {
        self.dz
    }

    pub fn face_area(&self) -> f64 {
        self.area
    }

    pub fn cell_volume(&self) -> f64 {
        self.dz * self.area
    }

    /// Center elevation of cell `i`, measured from the column base.
    pub fn cell_center(&self, i: usize) -> f64 {
        debug_assert!(i < self.n_cells);
        (i as f64 + 0.5) * self.dz
    }

    /// Elevation of vertex `j`. Vertex 0 is the base, vertex `n_cells`
    /// the loaded surface.
    pub fn vertex_z(&self, j: usize) -> f64 {
        debug_assert!(j < self.n_vertices());
        j as f64 * self.dz
    }

    pub fn cells(&self) -> std::ops::Range<usize> {
        0..self.n_cells
    }

    pub fn vertices(&self) -> std::ops::Range<usize> {
        0..self.n_vertices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_geometry() {
        let grid = ColumnGrid::new(4, 2.0, 1.5).unwrap();
        assert_eq!(grid.n_cells(), 4);
        assert_eq!(grid.n_vertices(), 5);
        assert_relative_eq!(grid.dz(), 0.5);
        assert_relative_eq!(grid.cell_volume(), 0.75);
        assert_relative_eq!(grid.cell_center(0), 0.25);
        assert_relative_eq!(grid.cell_center(3), 1.75);
        assert_relative_eq!(grid.vertex_z(0), 0.0);
        assert_relative_eq!(grid.vertex_z(4), 2.0);
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        assert!(ColumnGrid::new(0, 1.0, 1.0).is_err());
        assert!(ColumnGrid::new(10, 0.0, 1.0).is_err());
        assert!(ColumnGrid::new(10, -2.0, 1.0).is_err());
        assert!(ColumnGrid::new(10, 1.0, 0.0).is_err());
        assert!(ColumnGrid::new(10, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_error_is_mesh_variant() {
        let err = ColumnGrid::new(0, 1.0, 1.0).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_code::MESH);
    }
}
