//! Per-step simulation driver.
//!
//! Step order follows the barrier structure of the underlying kernels:
//! migration must run after the previous step's integration and before the
//! index rebuilds, so positions are final when the sort-by-key begins.

use std::error::Error;

use kernel::{ParticleTile, SpatialIndex};

use crate::config::SimulationConfig;
use crate::decomposition::Decomposition;
use crate::force::{compute_forces, move_particles, ForceParams};
use crate::halo::DecompositionArtifacts;
use crate::migration::{migrate, MigrationError, MigrationReport, NoTransport, Transport};
use crate::seed::seed_particles;
use crate::{create_index, region_for};

/// A running simulation: the decomposition, its halo artifacts, the
/// per-sub-domain particle buffers, and one spatial index per owned
/// sub-domain.
pub struct Simulation {
    decomp: Decomposition,
    artifacts: DecompositionArtifacts,
    tiles: Vec<ParticleTile>,
    indexes: Vec<Option<Box<dyn SpatialIndex>>>,
    my_proc: u32,
    transport: Box<dyn Transport>,
    force: ForceParams,
    dt: f32,
    steps_taken: u64,
}

impl Simulation {
    /// Build a simulation from a validated configuration for rank
    /// `my_proc`.
    pub fn new(config: &SimulationConfig, my_proc: u32) -> Result<Self, Box<dyn Error>> {
        config.validate()?;

        let geom = config.geometry();
        let decomp = Decomposition::split(geom, config.splits, config.num_procs);
        let artifacts = DecompositionArtifacts::build(&decomp);

        let tiles = seed_particles(
            &decomp,
            my_proc,
            config.particles_per_cell,
            config.thermal_momentum_mean,
            config.thermal_momentum_std,
            config.seed,
        );
        let total_particles: usize = tiles.iter().map(ParticleTile::num_real).sum();
        tracing::info!(
            "Simulation '{}': {} sub-domains, {} particles",
            config.name,
            decomp.len(),
            total_particles
        );

        // Any one tile can hold at most every particle in the run (its own
        // plus ghosts), so the global count bounds the index capacity.
        let indexes = decomp
            .iter()
            .map(|(grid, bounds)| {
                (decomp.owner_of(grid) == my_proc).then(|| {
                    create_index(
                        &config.backend,
                        region_for(&decomp.geom, bounds),
                        config.cutoff,
                        total_particles,
                    )
                })
            })
            .collect();

        Ok(Self {
            decomp,
            artifacts,
            tiles,
            indexes,
            my_proc,
            transport: Box::new(NoTransport),
            force: config.force_params(),
            dt: config.dt,
            steps_taken: 0,
        })
    }

    /// Replace the cross-process transport.
    pub fn set_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = transport;
    }

    /// Advance the simulation by one step:
    /// migrate -> rebuild indexes -> forces -> integrate.
    pub fn step(&mut self) -> Result<MigrationReport, MigrationError> {
        let report = migrate(
            &self.decomp,
            &self.artifacts,
            &mut self.tiles,
            self.my_proc,
            self.transport.as_mut(),
        )?;

        let geom = &self.decomp.geom;
        for gid in self.decomp.owned_by(self.my_proc) {
            let index = self.indexes[gid]
                .as_mut()
                .expect("owned sub-domain without an index");
            let tile = &mut self.tiles[gid];

            // Rebuild over real + ghost particles.
            index.rebuild(&tile.particles.x, &tile.particles.y, &tile.particles.z);

            compute_forces(tile, index.neighbor_list(), &self.force);
            move_particles(tile, self.dt, geom.prob_lo, geom.prob_hi);
        }

        self.steps_taken += 1;
        Ok(report)
    }

    /// Advance by `steps` steps.
    pub fn run(&mut self, steps: u64) -> Result<(), MigrationError> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Number of steps taken so far.
    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// The decomposition in use.
    pub fn decomposition(&self) -> &Decomposition {
        &self.decomp
    }

    /// The halo artifacts in use.
    pub fn artifacts(&self) -> &DecompositionArtifacts {
        &self.artifacts
    }

    /// The particle buffer of sub-domain `grid`.
    pub fn tile(&self, grid: usize) -> &ParticleTile {
        &self.tiles[grid]
    }

    /// Total real particles across every locally owned sub-domain.
    pub fn total_real_particles(&self) -> usize {
        self.decomp
            .owned_by(self.my_proc)
            .into_iter()
            .map(|gid| self.tiles[gid].num_real())
            .sum()
    }

    /// The neighbor list of an owned sub-domain, valid until the next step.
    pub fn neighbor_list(&self, grid: usize) -> &kernel::NeighborList {
        self.indexes[grid]
            .as_ref()
            .expect("no index for that sub-domain")
            .neighbor_list()
    }

    /// Render every particle's partner list, one line per particle.
    /// Debug output only; quadratic in particle count to read.
    pub fn describe_neighbor_lists(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for gid in self.decomp.owned_by(self.my_proc) {
            let list = self.neighbor_list(gid);
            for i in 0..self.tiles[gid].total() {
                write!(out, "Particle {i} will collide with: ").ok();
                for j in list.neighbors_of(i) {
                    write!(out, "{j} ").ok();
                }
                out.push('\n');
            }
        }
        out
    }
}
