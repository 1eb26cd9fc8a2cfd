//! Orchestration layer for the distributed particle simulation.
//!
//! This crate owns everything above the per-sub-domain compute core:
//! - Domain decomposition (sub-domain boxes, owner map, intersections)
//! - Boundary-region decomposition and neighbor masks
//! - Destination-sorted particle migration with ghost exchange
//! - Particle seeding, force evaluation, and integration
//! - Configuration and the per-step driver

#![warn(missing_docs)]

pub mod config;
pub mod decomposition;
pub mod force;
pub mod halo;
pub mod migration;
pub mod runner;
pub mod seed;

pub use config::{BackendType, SimulationConfig};
pub use decomposition::{Box3, Decomposition, DomainGeometry, IntVect};
pub use halo::{DecompositionArtifacts, HaloRegion, NeighborMask, INTERIOR};
pub use migration::{migrate, MigrationError, MigrationReport, NoTransport, Transport};
pub use runner::Simulation;

use kernel::{CpuIndex, GridRegion, SpatialIndex};

use std::error::Error;

/// Create a complete simulation from a configuration file.
///
/// Loads and validates the configuration, decomposes the domain, builds the
/// halo artifacts, seeds the particles, and wires up one spatial index per
/// owned sub-domain.
///
/// # Example
/// ```no_run
/// let mut sim = orchestrator::create_simulation("config/midplane.json")?;
/// sim.step()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_simulation(config_path: &str) -> Result<Simulation, Box<dyn Error>> {
    tracing::info!("Creating simulation from config: {}", config_path);
    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);
    Simulation::new(&config, 0)
}

/// The grid region covering one sub-domain's cell range.
pub fn region_for(geom: &DomainGeometry, bounds: &Box3) -> GridRegion {
    GridRegion {
        origin: geom.prob_lo,
        inv_cell_size: geom.inv_cell_size,
        lo: bounds.lo,
        dims: [
            bounds.length(0) as u32,
            bounds.length(1) as u32,
            bounds.length(2) as u32,
        ],
    }
}

/// Create a spatial index for one sub-domain based on the backend
/// configuration.
///
/// For `Auto`, attempts the GPU first and falls back to the CPU if
/// unavailable. For `Gpu`, returns a GPU index or panics. For `Cpu`, always
/// returns the CPU reference implementation.
pub fn create_index(
    backend: &BackendType,
    region: GridRegion,
    cutoff: f32,
    max_particles: usize,
) -> Box<dyn SpatialIndex> {
    match backend {
        BackendType::Cpu => {
            tracing::debug!("Creating CPU spatial index");
            Box::new(CpuIndex::new(region, cutoff))
        }
        #[cfg(feature = "gpu")]
        BackendType::Gpu => {
            tracing::debug!("Creating GPU spatial index");
            match kernel::GpuIndex::new(region, cutoff, max_particles) {
                Ok(gpu) => Box::new(gpu),
                Err(e) => {
                    panic!("GPU backend requested but initialization failed: {e}");
                }
            }
        }
        #[cfg(not(feature = "gpu"))]
        BackendType::Gpu => {
            panic!("GPU backend requested but 'gpu' feature is not enabled. Compile with --features gpu");
        }
        #[cfg(feature = "gpu")]
        BackendType::Auto => {
            if kernel::gpu::gpu_available() {
                match kernel::GpuIndex::new(region, cutoff, max_particles) {
                    Ok(gpu) => Box::new(gpu),
                    Err(e) => {
                        tracing::warn!("GPU init failed ({e}), falling back to CPU");
                        Box::new(CpuIndex::new(region, cutoff))
                    }
                }
            } else {
                tracing::debug!("No GPU available, using CPU spatial index");
                Box::new(CpuIndex::new(region, cutoff))
            }
        }
        #[cfg(not(feature = "gpu"))]
        BackendType::Auto => {
            tracing::debug!("GPU feature not enabled, using CPU spatial index");
            Box::new(CpuIndex::new(region, cutoff))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_covers_sub_domain_cells() {
        let geom = DomainGeometry::new([0.0; 3], [1.0; 3], [10; 3], [false; 3]);
        let bounds = Box3::new([5, 0, 0], [9, 9, 9]);
        let region = region_for(&geom, &bounds);

        assert_eq!(region.dims, [5, 10, 10]);
        assert_eq!(region.lo, [5, 0, 0]);
        // A position just right of the midplane falls in local cell 0.
        assert_eq!(region.cell_coords(0.501, 0.05, 0.05), [0, 0, 0]);
    }

    #[test]
    fn cpu_backend_always_available() {
        let geom = DomainGeometry::new([0.0; 3], [1.0; 3], [10; 3], [false; 3]);
        let region = region_for(&geom, &Box3::new([0; 3], [9; 3]));
        let mut index = create_index(&BackendType::Cpu, region, 0.1, 100);
        index.rebuild(&[0.5], &[0.5], &[0.5]);
        assert_eq!(index.neighbor_list().total(), 0);
    }
}
