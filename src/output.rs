//! CSV output: column profiles and the run summary time series
//!
//! Two products per run. `summary.csv` gets one row per accepted time
//! step with the scalars worth plotting against time (base pressure,
//! surface settlement, total fluid mass, Newton effort). Profile files
//! `profile_NNNNN.csv` hold the full column state at the configured step
//! interval, always including step 0 and the final step. Disabled output
//! turns every call into a no-op so the driver stays branch-free.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::config::OutputConfig;
use crate::coupling::CouplingManager;
use crate::domain::{SolutionState, SubdomainId};
use crate::error::Result;
use crate::grid::ColumnGrid;
use crate::newton::NewtonStepReport;
use crate::physics::FlowKernel;

pub struct SnapshotWriter {
    directory: PathBuf,
    interval: usize,
    grid: ColumnGrid,
    oedometric_modulus: f64,
    summary: Option<BufWriter<File>>,
    last_profile_step: Option<usize>,
}

impl SnapshotWriter {
    pub fn new(
        config: &OutputConfig,
        grid: &ColumnGrid,
        oedometric_modulus: f64,
    ) -> Result<Self> {
        let directory = PathBuf::from(&config.directory);
        let summary = if config.enabled {
            fs::create_dir_all(&directory)?;
            let mut file = BufWriter::new(File::create(directory.join("summary.csv"))?);
            writeln!(
                file,
                "time,dt,newton_iterations,linear_iterations,base_pressure,settlement,fluid_mass"
            )?;
            Some(file)
        } else {
            None
        };

        Ok(SnapshotWriter {
            directory,
            interval: config.interval,
            grid: grid.clone(),
            oedometric_modulus,
            summary,
            last_profile_step: None,
        })
    }

    pub fn enabled(&self) -> bool {
        self.summary.is_some()
    }

    /// Total fluid mass in the column (kg), the conserved quantity of the
    /// flow subproblem up to boundary drainage.
    pub fn total_fluid_mass(
        &self,
        state: &SolutionState,
        manager: &CouplingManager,
        flow: &FlowKernel,
    ) -> f64 {
        self.grid
            .cells()
            .map(|i| flow.cell_fluid_mass(manager.porosity(i), state.dof(SubdomainId::Flow, i)))
            .sum()
    }

    /// Snapshot of the initial state: summary baseline row plus the
    /// step-0 profile.
    pub fn record_initial(
        &mut self,
        state: &SolutionState,
        manager: &CouplingManager,
        flow: &FlowKernel,
    ) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        self.append_summary(0.0, 0.0, 0, 0, state, manager, flow)?;
        self.write_profile(0, 0.0, state, manager)
    }

    /// Record one accepted step: always a summary row, plus a profile at
    /// the configured interval.
    pub fn record_step(
        &mut self,
        step_index: usize,
        time: f64,
        report: &NewtonStepReport,
        state: &SolutionState,
        manager: &CouplingManager,
        flow: &FlowKernel,
    ) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        self.append_summary(
            time,
            report.accepted_dt,
            report.iterations,
            report.total_linear_iterations,
            state,
            manager,
            flow,
        )?;
        if step_index % self.interval == 0 {
            self.write_profile(step_index, time, state, manager)?;
        }
        Ok(())
    }

    /// Write the final profile (unless this step already has one) and
    /// flush the summary.
    pub fn finish(
        &mut self,
        step_index: usize,
        time: f64,
        state: &SolutionState,
        manager: &CouplingManager,
    ) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        if self.last_profile_step != Some(step_index) {
            self.write_profile(step_index, time, state, manager)?;
        }
        if let Some(file) = self.summary.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn append_summary(
        &mut self,
        time: f64,
        dt: f64,
        newton_iterations: usize,
        linear_iterations: usize,
        state: &SolutionState,
        manager: &CouplingManager,
        flow: &FlowKernel,
    ) -> Result<()> {
        let base_pressure = state.dof(SubdomainId::Flow, 0);
        let top_vertex = self.grid.n_vertices() - 1;
        let settlement = -state.dof(SubdomainId::Mechanics, top_vertex);
        let fluid_mass = self.total_fluid_mass(state, manager, flow);

        if let Some(file) = self.summary.as_mut() {
            writeln!(
                file,
                "{:.6e},{:.6e},{},{},{:.6e},{:.6e},{:.6e}",
                time, dt, newton_iterations, linear_iterations, base_pressure, settlement,
                fluid_mass
            )?;
        }
        Ok(())
    }

    fn write_profile(
        &mut self,
        step_index: usize,
        time: f64,
        state: &SolutionState,
        manager: &CouplingManager,
    ) -> Result<()> {
        let path = self
            .directory
            .join(format!("profile_{:05}.csv", step_index));
        let mut file = BufWriter::new(File::create(path)?);

        writeln!(file, "# t = {:.6e} s", time)?;
        writeln!(
            file,
            "z,pressure,displacement,strain,porosity,permeability,total_stress"
        )?;

        let u = state.slice(SubdomainId::Mechanics);
        let dz = self.grid.dz();
        for i in self.grid.cells() {
            let z = self.grid.cell_center(i);
            let pressure = state.dof(SubdomainId::Flow, i);
            let displacement = 0.5 * (u[i] + u[i + 1]);
            let strain = (u[i + 1] - u[i]) / dz;
            let porosity = manager.porosity(i);
            let permeability = manager.permeability(i);
            let total_stress = self.oedometric_modulus * strain - manager.pore_pressure_term(i);
            writeln!(
                file,
                "{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e}",
                z, pressure, displacement, strain, porosity, permeability, total_stress
            )?;
        }

        file.flush()?;
        self.last_profile_step = Some(step_index);
        Ok(())
    }
}
