use std::env;
use std::process;

use poro_simulator::{
    Assembler, ColumnGrid, CouplingManager, exit_code, FlowKernel, MechanicsKernel, NewtonSolver,
    PerDomain, Result, SimulationConfig, SnapshotWriter, SolutionState, solver_from_config,
    SubdomainId, TimeLoop,
};

fn run() -> Result<()> {
    println!("=== 1-D Consolidation: Coupled Flow / Poroelastic Mechanics ===\n");

    let config = match env::args().nth(1) {
        Some(path) => {
            println!("Loading configuration from {}", path);
            SimulationConfig::from_file(&path)?
        }
        None => {
            println!("No config file given, using built-in defaults");
            let config = SimulationConfig::default();
            config.validate()?;
            config
        }
    };
    config.print_summary();

    let grid = ColumnGrid::new(config.grid.n_cells, config.grid.height, config.grid.area)?;
    let assembler = Assembler::new(
        FlowKernel::new(&grid, &config.fluid),
        MechanicsKernel::new(&grid, &config.solid),
    );
    let mut manager = CouplingManager::new(&grid, &config.coupling, &config.solid);

    let subdomains = assembler.subdomains();
    let mut new = SolutionState::zeros(PerDomain::from_fn(|id| subdomains[id].num_dofs));
    assembler.apply_initial_solution(&mut new);
    let mut old = new.clone();
    manager.initialize(
        &subdomains[SubdomainId::Flow],
        &subdomains[SubdomainId::Mechanics],
        &new,
    )?;

    let linear_solver = solver_from_config(&config.linear_solver)?;
    println!("Linear solver: {}\n", linear_solver.name());
    let mut newton = NewtonSolver::new(config.newton.clone(), linear_solver);

    let mut time_loop = TimeLoop::new(&config.time);
    let mut writer = SnapshotWriter::new(
        &config.output,
        &grid,
        assembler.mechanics_kernel().moduli().oedometric_modulus(),
    )?;
    writer.record_initial(&new, &manager, assembler.flow_kernel())?;

    time_loop.start();
    while !time_loop.finished() {
        let dt = time_loop.step_size();
        let report = newton.solve_step(
            &assembler,
            &mut manager,
            &mut new,
            &old,
            time_loop.time(),
            dt,
            time_loop.min_step_size(),
        )?;

        old.assign_from(&new);
        manager.advance_time_step(&new)?;
        time_loop.advance_time_step(report.accepted_dt);

        println!(
            "  step {:4}: t = {:10.4e} s, dt = {:.4e} s, newton = {:2}, linear = {:4}",
            time_loop.step_index(),
            time_loop.time(),
            report.accepted_dt,
            report.iterations,
            report.total_linear_iterations
        );

        writer.record_step(
            time_loop.step_index(),
            time_loop.time(),
            &report,
            &new,
            &manager,
            assembler.flow_kernel(),
        )?;
        time_loop.set_time_step_size(report.suggested_dt);
    }
    writer.finish(time_loop.step_index(), time_loop.time(), &new, &manager)?;

    let top_vertex = grid.n_vertices() - 1;
    println!("\n=== Run Complete ===");
    println!(
        "  Simulated time:   {:.4e} s in {} steps",
        time_loop.time(),
        time_loop.step_index()
    );
    println!(
        "  Final settlement: {:.4e} m",
        -new.dof(SubdomainId::Mechanics, top_vertex)
    );
    println!(
        "  Base pressure:    {:.4e} Pa",
        new.dof(SubdomainId::Flow, 0)
    );
    println!("  Wall time:        {:.3} s", time_loop.elapsed());
    if writer.enabled() {
        println!("  Output:           {}/", config.output.directory);
    }

    Ok(())
}

fn main() {
    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => exit_code::SUCCESS,
        Ok(Err(e)) => {
            eprintln!("error: {}", e);
            e.exit_code()
        }
        Err(_) => {
            eprintln!("error: terminated by unexpected panic");
            exit_code::UNKNOWN
        }
    };
    process::exit(code);
}
