//! Run a small distributed simulation and print the per-sub-domain halo
//! report: for each halo region, the contributing neighbor ids and the
//! number of particles sorted into it.
//!
//! Usage: `halo_report [config.json]`. Without an argument, runs the
//! built-in midplane scenario: a unit cube split in two along x, periodic
//! on y and z, cutoff = cell size = 0.1.

use orchestrator::config::{BackendType, DomainBounds, SimulationConfig};
use orchestrator::Simulation;

fn builtin_scenario() -> SimulationConfig {
    SimulationConfig {
        name: "midplane".to_string(),
        domain: DomainBounds {
            min: [0.0; 3],
            max: [1.0; 3],
        },
        cells: [10; 3],
        splits: [2, 1, 1],
        num_procs: 1,
        periodic: [false, true, true],
        cutoff: 0.1,
        min_pair_distance: 1.0e-4,
        mass: 1.0,
        dt: 1.0e-3,
        max_timesteps: Some(5),
        particles_per_cell: [1, 1, 1],
        thermal_momentum_mean: 0.0,
        thermal_momentum_std: 0.5,
        seed: 42,
        backend: BackendType::Auto,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::load(&path)?,
        None => {
            tracing::info!("No config given; running the built-in midplane scenario");
            builtin_scenario()
        }
    };
    let mut sim = Simulation::new(&config, 0)?;

    let steps = config.max_timesteps.unwrap_or(5);
    for step in 0..steps {
        let report = sim.step()?;
        println!("Step {step}:");
        print!("{report}");
    }

    // Partner lists are readable only for small runs.
    if sim.total_real_particles() <= 200 {
        print!("{}", sim.describe_neighbor_lists());
    }

    tracing::info!("Completed {} steps", sim.steps_taken());
    Ok(())
}
