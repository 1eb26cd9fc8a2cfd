//! Configuration parsing and validation for the distributed simulation.

use serde::{Deserialize, Serialize};
use std::fs;

use crate::decomposition::DomainGeometry;
use crate::force::ForceParams;

/// Main simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name.
    pub name: String,
    /// Simulation domain bounds.
    pub domain: DomainBounds,
    /// Global cell grid dimensions.
    pub cells: [u32; 3],
    /// Number of sub-domains per axis.
    pub splits: [u32; 3],
    /// Number of owning processes (sub-domains are assigned round-robin).
    #[serde(default = "default_num_procs")]
    pub num_procs: u32,
    /// Periodicity per axis.
    #[serde(default)]
    pub periodic: [bool; 3],
    /// Interaction cutoff radius.
    pub cutoff: f32,
    /// Minimum pair distance for force evaluation.
    #[serde(default = "default_min_pair_distance")]
    pub min_pair_distance: f32,
    /// Particle mass.
    #[serde(default = "default_mass")]
    pub mass: f32,
    /// Timestep duration.
    #[serde(default = "default_dt")]
    pub dt: f32,
    /// Stop after this many timesteps.
    pub max_timesteps: Option<u64>,
    /// Lattice sites per cell along each axis.
    #[serde(default = "default_particles_per_cell")]
    pub particles_per_cell: [u32; 3],
    /// Mean of the Gaussian thermal momentum.
    #[serde(default)]
    pub thermal_momentum_mean: f32,
    /// Standard deviation of the Gaussian thermal momentum.
    #[serde(default = "default_momentum_std")]
    pub thermal_momentum_std: f32,
    /// RNG seed for particle initialization.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Which spatial-index back-end to use.
    #[serde(default)]
    pub backend: BackendType,
}

/// Domain bounding box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainBounds {
    /// Minimum corner [x, y, z].
    pub min: [f32; 3],
    /// Maximum corner [x, y, z].
    pub max: [f32; 3],
}

/// Spatial-index back-end selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum BackendType {
    /// Use the GPU when one is available, otherwise the CPU.
    #[default]
    Auto,
    /// Always use the CPU reference implementation.
    Cpu,
    /// Require the GPU; fail if unavailable.
    Gpu,
}

// Default values
fn default_num_procs() -> u32 {
    1
}

fn default_min_pair_distance() -> f32 {
    1.0e-4
}

fn default_mass() -> f32 {
    1.0
}

fn default_dt() -> f32 {
    1.0e-3
}

fn default_particles_per_cell() -> [u32; 3] {
    [1, 1, 1]
}

fn default_momentum_std() -> f32 {
    0.1
}

fn default_seed() -> u64 {
    42
}

impl SimulationConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        let config: SimulationConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config JSON: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        for a in 0..3 {
            if self.domain.min[a] >= self.domain.max[a] {
                return Err(format!("Domain min must be less than max on axis {a}"));
            }
            if self.cells[a] == 0 {
                return Err("Cell counts must be at least 1".to_string());
            }
            if self.splits[a] == 0 {
                return Err("Split counts must be at least 1".to_string());
            }
            if self.particles_per_cell[a] == 0 {
                return Err("particles_per_cell must be at least 1".to_string());
            }
        }

        if self.cutoff <= 0.0 {
            return Err("Cutoff must be positive".to_string());
        }

        // The 3x3x3 stencil must cover a cutoff sphere: cells may never be
        // smaller than the cutoff.
        for a in 0..3 {
            let cell = (self.domain.max[a] - self.domain.min[a]) / self.cells[a] as f32;
            if cell < self.cutoff {
                return Err(format!(
                    "Cell size {cell} on axis {a} is smaller than the cutoff {}",
                    self.cutoff
                ));
            }
        }

        // Boundary decomposition needs room for two disjoint 1-cell slabs
        // inside every sub-domain after shrinking by one.
        for a in 0..3 {
            let chunk = self.cells[a] / self.splits[a];
            if chunk < 5 {
                return Err(format!(
                    "Sub-domains are only {chunk} cells wide on axis {a}; \
                     boundary decomposition requires at least 5"
                ));
            }
        }

        if self.num_procs == 0 {
            return Err("num_procs must be at least 1".to_string());
        }
        if self.min_pair_distance <= 0.0 {
            return Err("min_pair_distance must be positive".to_string());
        }
        if self.mass <= 0.0 {
            return Err("Mass must be positive".to_string());
        }
        if self.dt <= 0.0 {
            return Err("Timestep must be positive".to_string());
        }
        if self.thermal_momentum_std < 0.0 {
            return Err("thermal_momentum_std must be non-negative".to_string());
        }
        if let Some(max_timesteps) = self.max_timesteps {
            if max_timesteps == 0 {
                return Err("max_timesteps must be at least 1".to_string());
            }
        }

        Ok(())
    }

    /// The domain geometry implied by this configuration.
    pub fn geometry(&self) -> DomainGeometry {
        DomainGeometry::new(self.domain.min, self.domain.max, self.cells, self.periodic)
    }

    /// The force parameters implied by this configuration.
    pub fn force_params(&self) -> ForceParams {
        ForceParams {
            cutoff: self.cutoff,
            min_r: self.min_pair_distance,
            mass: self.mass,
        }
    }
}
