//! Neighbor-list enumeration over a cell list.
//!
//! Two passes over the particles (first sizing, then filling) so the flat
//! neighbor array can be allocated once, with no growth inside the scan.
//! Lists are full (asymmetric): both `(i, j)` and `(j, i)` are evaluated and
//! stored, which doubles predicate evaluations but lets force accumulation
//! stay one-sided.

use crate::cell_list::{CellList, GridRegion};

/// Flattened per-particle neighbor lists, rebuilt every step.
///
/// Particle `i`'s partners are `indices[offsets[i]..offsets[i+1]]`. Offsets
/// are monotone non-decreasing and `offsets[n]` equals `indices.len()`.
#[derive(Debug, Clone, Default)]
pub struct NeighborList {
    /// Exclusive-prefix offsets, length `n + 1`.
    pub offsets: Vec<u32>,
    /// Flat array of neighbor particle indices.
    pub indices: Vec<u32>,
}

impl NeighborList {
    /// Build the neighbor list from a cell list.
    ///
    /// `check_pair(i, j)` is the admissibility predicate over *original*
    /// particle indices; it must be symmetric in its arguments (this is a
    /// precondition, not enforced here). Self-pairs are excluded by index
    /// identity, never by position, since duplicate positions are legal.
    pub fn build<F>(
        region: &GridRegion,
        x: &[f32],
        y: &[f32],
        z: &[f32],
        cell_list: &CellList,
        check_pair: F,
    ) -> Self
    where
        F: Fn(u32, u32) -> bool,
    {
        let n = x.len();

        // --- Pass 1: count admissible partners per particle ---
        let mut counts = vec![0u32; n];
        for i in 0..n {
            let mut count = 0u32;
            Self::scan_stencil(region, x, y, z, cell_list, i as u32, |j| {
                if check_pair(i as u32, j) {
                    count += 1;
                }
            });
            counts[i] = count;
        }

        // --- Exclusive prefix sum over counts ---
        let mut offsets = vec![0u32; n + 1];
        let mut running = 0u32;
        for i in 0..n {
            offsets[i] = running;
            running += counts[i];
        }
        offsets[n] = running;

        // --- Pass 2: fill, in the same stencil visit order ---
        let mut indices = vec![0u32; running as usize];
        for i in 0..n {
            let mut slot = offsets[i] as usize;
            Self::scan_stencil(region, x, y, z, cell_list, i as u32, |j| {
                if check_pair(i as u32, j) {
                    indices[slot] = j;
                    slot += 1;
                }
            });
            debug_assert_eq!(slot, offsets[i + 1] as usize);
        }

        NeighborList { offsets, indices }
    }

    /// Visit every candidate `j != i` in the 3x3x3 block of cells around
    /// `i`'s cell, clamped to the region (no wraparound within one
    /// sub-domain's list).
    #[inline]
    fn scan_stencil<G>(
        region: &GridRegion,
        x: &[f32],
        y: &[f32],
        z: &[f32],
        cell_list: &CellList,
        i: u32,
        mut visit: G,
    ) where
        G: FnMut(u32),
    {
        let iu = i as usize;
        let c = region.cell_coords(x[iu], y[iu], z[iu]);
        let dims = region.dims;

        for ii in (c[0] - 1).max(0)..=(c[0] + 1).min(dims[0] as i32 - 1) {
            for jj in (c[1] - 1).max(0)..=(c[1] + 1).min(dims[1] as i32 - 1) {
                for kk in (c[2] - 1).max(0)..=(c[2] + 1).min(dims[2] as i32 - 1) {
                    let cell = region.flat_index([ii, jj, kk]);
                    for &j in cell_list.cell_members(cell) {
                        if j == i {
                            continue;
                        }
                        visit(j);
                    }
                }
            }
        }
    }

    /// Partner indices of particle `i`, valid until the next rebuild.
    pub fn neighbors_of(&self, i: usize) -> &[u32] {
        let start = self.offsets[i] as usize;
        let stop = self.offsets[i + 1] as usize;
        &self.indices[start..stop]
    }

    /// Total number of stored pairs.
    pub fn total(&self) -> usize {
        self.indices.len()
    }
}

/// The standard admissibility predicate: squared distance within cutoff.
pub fn cutoff_check<'a>(
    x: &'a [f32],
    y: &'a [f32],
    z: &'a [f32],
    cutoff: f32,
) -> impl Fn(u32, u32) -> bool + 'a {
    let cutoff_sq = cutoff * cutoff;
    move |i: u32, j: u32| {
        let (i, j) = (i as usize, j as usize);
        let dx = x[i] - x[j];
        let dy = y[i] - y[j];
        let dz = z[i] - z[j];
        dx * dx + dy * dy + dz * dz <= cutoff_sq
    }
}
