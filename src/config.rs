//! Configuration management for coupled consolidation runs
//!
//! Reads TOML configuration files and provides the validated parameter
//! set consumed by every component: column geometry, fluid and solid
//! properties, coupling constants, time-stepping bounds, Newton controls,
//! linear solver selection, and output cadence. The configuration is
//! constructed once at startup and passed by reference; no component
//! reads parameters from anywhere else.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, SimulatorError};

/// Main simulation configuration.
///
/// Every section and field carries a default encoding the step-load
/// consolidation scenario, so an empty TOML file (or no file at all) runs
/// a meaningful simulation and a partial file overrides selectively.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub fluid: FluidConfig,
    pub solid: SolidConfig,
    pub coupling: CouplingConfig,
    pub time: TimeConfig,
    pub newton: NewtonControl,
    pub linear_solver: LinearSolverConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of cells in the column
    pub n_cells: usize,
    /// Column height (m)
    pub height: f64,
    /// Cross-section area (m^2)
    pub area: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            n_cells: 40,
            height: 10.0,
            area: 1.0,
        }
    }
}

/// Fluid properties. Pressures are gauge values: zero means ambient, so a
/// run starts from mechanical equilibrium when the initial pressure, the
/// drainage pressure and the initial displacement are all zero.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FluidConfig {
    /// Reference density (kg/m^3)
    pub density: f64,
    /// Dynamic viscosity (Pa·s)
    pub viscosity: f64,
    /// Fluid compressibility (1/Pa)
    pub compressibility: f64,
    /// Gauge pressure at which density equals the reference density (Pa)
    pub reference_pressure: f64,
    /// Uniform initial gauge pressure (Pa)
    pub initial_pressure: f64,
    /// Fixed gauge pressure at the drained top boundary (Pa)
    pub drainage_pressure: f64,
}

impl Default for FluidConfig {
    fn default() -> Self {
        FluidConfig {
            density: 1000.0,
            viscosity: 1.0e-3,
            compressibility: 4.5e-10,
            reference_pressure: 0.0,
            initial_pressure: 0.0,
            drainage_pressure: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolidConfig {
    /// Young's modulus (Pa)
    pub youngs_modulus: f64,
    /// Poisson ratio
    pub poisson_ratio: f64,
    /// Reference porosity
    pub porosity: f64,
    /// Reference intrinsic permeability (m^2)
    pub permeability: f64,
    /// Compressive traction applied at the surface from t = 0 (Pa)
    pub surface_load: f64,
}

impl Default for SolidConfig {
    fn default() -> Self {
        SolidConfig {
            youngs_modulus: 1.0e7,
            poisson_ratio: 0.25,
            porosity: 0.4,
            permeability: 1.0e-12,
            surface_load: 1.0e4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CouplingConfig {
    /// Biot coefficient: fraction of pore pressure carried into total stress
    pub biot_coefficient: f64,
    /// Scaling of the strain-to-porosity feedback; 0 decouples mechanics
    /// from flow entirely
    pub strain_feedback: f64,
    /// Update permeability from porosity via the Kozeny-Carman relation
    pub permeability_from_porosity: bool,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        CouplingConfig {
            biot_coefficient: 1.0,
            strain_feedback: 1.0,
            permeability_from_porosity: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeConfig {
    /// End of the simulated interval (s)
    pub end_time: f64,
    /// First time-step size (s)
    pub initial_dt: f64,
    /// Smallest admissible step (s); retries below this are fatal
    pub min_dt: f64,
    /// Largest admissible step (s)
    pub max_dt: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        TimeConfig {
            end_time: 1.0e4,
            initial_dt: 10.0,
            min_dt: 1.0e-3,
            max_dt: 500.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NewtonControl {
    /// Iteration budget per attempt before declaring divergence
    pub max_iterations: usize,
    /// Relative residual tolerance, applied per subdomain
    pub rel_tolerance: f64,
    /// Absolute residual tolerance for the flow subdomain (kg/s)
    pub abs_tolerance_flow: f64,
    /// Absolute residual tolerance for the mechanics subdomain (N)
    pub abs_tolerance_mechanics: f64,
    /// Update damping factor in (0, 1]
    pub damping: f64,
    /// Step-size growth applied after fast convergence
    pub growth_factor: f64,
    /// Convergence within this many iterations counts as fast
    pub growth_iterations: usize,
    /// Step-size reduction applied on a failed attempt, in (0, 1)
    pub reduction_factor: f64,
    /// Failed attempts in a row before the failure becomes fatal
    pub max_consecutive_failures: usize,
    /// Print per-iteration residual norms
    pub verbose: bool,
}

impl Default for NewtonControl {
    fn default() -> Self {
        NewtonControl {
            max_iterations: 12,
            rel_tolerance: 1.0e-8,
            abs_tolerance_flow: 1.0e-12,
            abs_tolerance_mechanics: 1.0e-8,
            damping: 1.0,
            growth_factor: 1.25,
            growth_iterations: 4,
            reduction_factor: 0.5,
            max_consecutive_failures: 5,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LinearSolverConfig {
    /// "direct" or "bicgstab"
    pub method: String,
    /// "none", "jacobi" or "ilu0" (iterative method only)
    pub preconditioner: String,
    /// Relative tolerance of the iterative method
    pub tolerance: f64,
    /// Iteration cap of the iterative method
    pub max_iterations: usize,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        LinearSolverConfig {
            method: "direct".to_string(),
            preconditioner: "ilu0".to_string(),
            tolerance: 1.0e-10,
            max_iterations: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub enabled: bool,
    pub directory: String,
    /// Write a profile snapshot every this many accepted steps
    pub interval: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            enabled: true,
            directory: "output".to_string(),
            interval: 10,
        }
    }
}

impl SimulationConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            SimulatorError::Configuration(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: SimulationConfig = toml::from_str(&contents).map_err(|e| {
            SimulatorError::Configuration(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check every parameter against its admissible range. The message
    /// names the offending parameter so the user can fix the input file
    /// without reading source code.
    pub fn validate(&self) -> Result<()> {
        fn bad(param: &str, detail: String) -> SimulatorError {
            SimulatorError::Configuration(format!("{}: {}", param, detail))
        }
        fn positive(param: &str, v: f64) -> Result<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(bad(param, format!("must be positive and finite, got {}", v)))
            }
        }

        positive("fluid.density", self.fluid.density)?;
        positive("fluid.viscosity", self.fluid.viscosity)?;
        if !self.fluid.compressibility.is_finite() || self.fluid.compressibility < 0.0 {
            return Err(bad(
                "fluid.compressibility",
                format!("must be non-negative, got {}", self.fluid.compressibility),
            ));
        }
        for (name, v) in [
            ("fluid.reference_pressure", self.fluid.reference_pressure),
            ("fluid.initial_pressure", self.fluid.initial_pressure),
            ("fluid.drainage_pressure", self.fluid.drainage_pressure),
            ("solid.surface_load", self.solid.surface_load),
        ] {
            if !v.is_finite() {
                return Err(bad(name, format!("must be finite, got {}", v)));
            }
        }

        positive("solid.youngs_modulus", self.solid.youngs_modulus)?;
        let nu = self.solid.poisson_ratio;
        if !(nu > -1.0 && nu < 0.5) {
            return Err(bad(
                "solid.poisson_ratio",
                format!("must lie in (-1, 0.5), got {}", nu),
            ));
        }
        if !(self.solid.porosity > 0.0 && self.solid.porosity < 1.0) {
            return Err(bad(
                "solid.porosity",
                format!("must lie in (0, 1), got {}", self.solid.porosity),
            ));
        }
        positive("solid.permeability", self.solid.permeability)?;

        if !(0.0..=1.0).contains(&self.coupling.biot_coefficient) {
            return Err(bad(
                "coupling.biot_coefficient",
                format!("must lie in [0, 1], got {}", self.coupling.biot_coefficient),
            ));
        }
        if !(0.0..=1.0).contains(&self.coupling.strain_feedback) {
            return Err(bad(
                "coupling.strain_feedback",
                format!("must lie in [0, 1], got {}", self.coupling.strain_feedback),
            ));
        }

        positive("time.end_time", self.time.end_time)?;
        positive("time.initial_dt", self.time.initial_dt)?;
        positive("time.min_dt", self.time.min_dt)?;
        positive("time.max_dt", self.time.max_dt)?;
        if self.time.min_dt > self.time.max_dt {
            return Err(bad(
                "time.min_dt",
                format!(
                    "must not exceed time.max_dt ({} > {})",
                    self.time.min_dt, self.time.max_dt
                ),
            ));
        }
        if self.time.initial_dt < self.time.min_dt || self.time.initial_dt > self.time.max_dt {
            return Err(bad(
                "time.initial_dt",
                format!(
                    "must lie in [min_dt, max_dt] = [{}, {}], got {}",
                    self.time.min_dt, self.time.max_dt, self.time.initial_dt
                ),
            ));
        }

        if self.newton.max_iterations == 0 {
            return Err(bad("newton.max_iterations", "must be at least 1".into()));
        }
        positive("newton.rel_tolerance", self.newton.rel_tolerance)?;
        positive("newton.abs_tolerance_flow", self.newton.abs_tolerance_flow)?;
        positive(
            "newton.abs_tolerance_mechanics",
            self.newton.abs_tolerance_mechanics,
        )?;
        if !(self.newton.damping > 0.0 && self.newton.damping <= 1.0) {
            return Err(bad(
                "newton.damping",
                format!("must lie in (0, 1], got {}", self.newton.damping),
            ));
        }
        if !self.newton.growth_factor.is_finite() || self.newton.growth_factor < 1.0 {
            return Err(bad(
                "newton.growth_factor",
                format!("must be at least 1, got {}", self.newton.growth_factor),
            ));
        }
        if !(self.newton.reduction_factor > 0.0 && self.newton.reduction_factor < 1.0) {
            return Err(bad(
                "newton.reduction_factor",
                format!("must lie in (0, 1), got {}", self.newton.reduction_factor),
            ));
        }
        if self.newton.max_consecutive_failures == 0 {
            return Err(bad(
                "newton.max_consecutive_failures",
                "must be at least 1".into(),
            ));
        }

        match self.linear_solver.method.as_str() {
            "direct" | "bicgstab" => {}
            other => {
                return Err(bad(
                    "linear_solver.method",
                    format!("unknown method \"{}\" (expected \"direct\" or \"bicgstab\")", other),
                ))
            }
        }
        match self.linear_solver.preconditioner.as_str() {
            "none" | "jacobi" | "ilu0" => {}
            other => {
                return Err(bad(
                    "linear_solver.preconditioner",
                    format!(
                        "unknown preconditioner \"{}\" (expected \"none\", \"jacobi\" or \"ilu0\")",
                        other
                    ),
                ))
            }
        }
        positive("linear_solver.tolerance", self.linear_solver.tolerance)?;
        if self.linear_solver.max_iterations == 0 {
            return Err(bad("linear_solver.max_iterations", "must be at least 1".into()));
        }

        if self.output.interval == 0 {
            return Err(bad("output.interval", "must be at least 1".into()));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("═══════════════════════════════════════════════════════════════");
        println!("  Coupled Consolidation Configuration");
        println!("═══════════════════════════════════════════════════════════════");
        println!("Column:");
        println!(
            "  Height: {:.2} m, {} cells (dz = {:.3} m)",
            self.grid.height,
            self.grid.n_cells,
            self.grid.height / self.grid.n_cells as f64
        );

        println!("\nFluid:");
        println!(
            "  ρ = {:.1} kg/m³, μ = {:.2e} Pa·s, c_f = {:.2e} 1/Pa",
            self.fluid.density, self.fluid.viscosity, self.fluid.compressibility
        );
        println!(
            "  Initial pressure: {:.3e} Pa, drainage pressure: {:.3e} Pa",
            self.fluid.initial_pressure, self.fluid.drainage_pressure
        );

        println!("\nSolid:");
        println!(
            "  E = {:.2e} Pa, ν = {:.2}, φ₀ = {:.2}, k₀ = {:.2e} m²",
            self.solid.youngs_modulus,
            self.solid.poisson_ratio,
            self.solid.porosity,
            self.solid.permeability
        );
        println!("  Surface load: {:.3e} Pa", self.solid.surface_load);

        println!("\nCoupling:");
        println!(
            "  Biot α = {:.2}, strain feedback = {:.2}, Kozeny-Carman: {}",
            self.coupling.biot_coefficient,
            self.coupling.strain_feedback,
            if self.coupling.permeability_from_porosity {
                "on"
            } else {
                "off"
            }
        );

        println!("\nTime stepping:");
        println!(
            "  t_end = {:.3e} s, dt₀ = {:.3e} s, dt ∈ [{:.1e}, {:.1e}] s",
            self.time.end_time, self.time.initial_dt, self.time.min_dt, self.time.max_dt
        );

        println!("\nNewton:");
        println!(
            "  max {} iterations, rel tol = {:.1e}, damping = {:.2}",
            self.newton.max_iterations, self.newton.rel_tolerance, self.newton.damping
        );
        println!(
            "  retry: ×{:.2} on failure (max {} consecutive), grow ×{:.2} within {} iterations",
            self.newton.reduction_factor,
            self.newton.max_consecutive_failures,
            self.newton.growth_factor,
            self.newton.growth_iterations
        );

        println!("\nLinear solver:");
        println!(
            "  {} (preconditioner: {})",
            self.linear_solver.method, self.linear_solver.preconditioner
        );

        if self.output.enabled {
            println!("\nOutput:");
            println!(
                "  {}/ every {} accepted steps",
                self.output.directory, self.output.interval
            );
        }

        println!("═══════════════════════════════════════════════════════════════\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_overrides_defaults() {
        let toml_str = r#"
            [grid]
            n_cells = 8

            [newton]
            max_iterations = 30
        "#;
        let config: SimulationConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.grid.n_cells, 8);
        assert_eq!(config.newton.max_iterations, 30);
        // Untouched sections keep scenario defaults
        assert_eq!(config.time.end_time, 1.0e4);
        assert_eq!(config.linear_solver.method, "direct");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_names_offending_parameter() {
        let mut config = SimulationConfig::default();
        config.solid.poisson_ratio = 0.7;
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("solid.poisson_ratio"));

        let mut config = SimulationConfig::default();
        config.newton.damping = 0.0;
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("newton.damping"));
    }

    #[test]
    fn test_rejects_unknown_linear_solver() {
        let mut config = SimulationConfig::default();
        config.linear_solver.method = "umfpack".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_code::CONFIGURATION);
    }

    #[test]
    fn test_rejects_inconsistent_step_bounds() {
        let mut config = SimulationConfig::default();
        config.time.min_dt = 100.0;
        config.time.max_dt = 1.0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.time.initial_dt = 1.0e6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_broken_toml_is_configuration_error() {
        let dir = std::env::temp_dir().join("poro_sim_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        std::fs::write(&path, "[grid]\nn_cells = \"many\"").unwrap();

        let err = SimulationConfig::from_file(&path).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_code::CONFIGURATION);

        let err = SimulationConfig::from_file(dir.join("missing.toml")).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_code::CONFIGURATION);
    }
}
