//! Spatial index kernel for short-range particle interactions.
//!
//! This crate provides the per-sub-domain compute core for a distributed
//! particle simulation: binning particles into a uniform cell grid and
//! enumerating, for every particle, its interaction partners within cutoff.
//!
//! # Modules
//! - [`particle`] -- Struct-of-arrays particle storage.
//! - [`tile`] -- Per-sub-domain buffer with a real/ghost split.
//! - [`cell_list`] -- Counting-sort cell list over a local cell range.
//! - [`neighbor_list`] -- Two-pass (count, then fill) partner enumeration.

#![warn(missing_docs)]

pub mod cell_list;
pub mod neighbor_list;
pub mod particle;
pub mod tile;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use cell_list::{CellList, GridRegion};
pub use neighbor_list::{cutoff_check, NeighborList};
pub use particle::ParticleArrays;
pub use tile::ParticleTile;

#[cfg(feature = "gpu")]
pub use gpu::GpuIndex;

// ---------------------------------------------------------------------------
// SpatialIndex trait
// ---------------------------------------------------------------------------

/// Trait that all spatial-index back-ends (CPU, GPU) must implement.
///
/// A `SpatialIndex` owns the transient index structures for one sub-domain
/// and rebuilds them each step in two phases:
///
/// 1. Cell list: bin -> prefix sum -> scatter permutation
/// 2. Neighbor list: count -> prefix sum -> fill
///
/// Rebuilds run over the full local buffer (real + ghost particles) so
/// cross-boundary pairs are found.
pub trait SpatialIndex {
    /// Rebuild both index structures from current positions.
    fn rebuild(&mut self, x: &[f32], y: &[f32], z: &[f32]);

    /// The cell list from the last rebuild.
    fn cell_list(&self) -> &CellList;

    /// The neighbor list from the last rebuild.
    fn neighbor_list(&self) -> &NeighborList;
}

// ---------------------------------------------------------------------------
// CpuIndex -- reference CPU implementation of SpatialIndex
// ---------------------------------------------------------------------------

/// Reference CPU implementation of the spatial index.
///
/// Sequential loops reproduce the same aggregate results as the device
/// path (counts, offsets, permutation bijectivity); unlike the device path
/// its intra-cell permutation order is deterministic, which callers must
/// not rely on.
pub struct CpuIndex {
    region: GridRegion,
    cutoff: f32,
    cell_list: CellList,
    neighbor_list: NeighborList,
}

impl CpuIndex {
    /// Create an index over `region` using the standard cutoff predicate.
    pub fn new(region: GridRegion, cutoff: f32) -> Self {
        tracing::debug!(
            "CPU spatial index over {} cells, cutoff {cutoff}",
            region.total_cells()
        );
        Self {
            region,
            cutoff,
            cell_list: CellList::default(),
            neighbor_list: NeighborList::default(),
        }
    }

    /// The region this index covers.
    pub fn region(&self) -> &GridRegion {
        &self.region
    }
}

impl SpatialIndex for CpuIndex {
    fn rebuild(&mut self, x: &[f32], y: &[f32], z: &[f32]) {
        self.cell_list = CellList::build(&self.region, x, y, z);
        self.neighbor_list = NeighborList::build(
            &self.region,
            x,
            y,
            z,
            &self.cell_list,
            cutoff_check(x, y, z, self.cutoff),
        );
    }

    fn cell_list(&self) -> &CellList {
        &self.cell_list
    }

    fn neighbor_list(&self) -> &NeighborList {
        &self.neighbor_list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_index_rebuild_round_trip() {
        let region = GridRegion {
            origin: [0.0; 3],
            inv_cell_size: [10.0; 3],
            lo: [0; 3],
            dims: [10; 3],
        };
        let x = vec![0.45, 0.52, 0.95];
        let y = vec![0.5, 0.5, 0.95];
        let z = vec![0.5, 0.5, 0.95];

        let mut index = CpuIndex::new(region, 0.1);
        index.rebuild(&x, &y, &z);

        assert_eq!(index.cell_list().permutation.len(), 3);
        assert_eq!(index.neighbor_list().neighbors_of(0), &[1]);
        assert_eq!(index.neighbor_list().neighbors_of(1), &[0]);
        assert!(index.neighbor_list().neighbors_of(2).is_empty());
    }
}
