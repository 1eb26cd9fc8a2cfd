//! Uniform-grid cell list over a sub-domain's local cell-index range.
//!
//! Uses counting-sort permutation + per-cell offset arrays rather than
//! `HashMap` so the data layout maps directly to GPU buffers (no pointer
//! chasing). The cell size must be at least the interaction cutoff so that
//! the 27 (3x3x3) adjacent cells contain all potential partners.

/// Mapping from world-space positions to a sub-domain's local cell grid.
///
/// `lo` is the sub-domain's lower cell index in the global index space;
/// local coordinates are global coordinates minus `lo`, clamped into
/// `[0, dims - 1]` per axis. Clamping (rather than rejecting) keeps the
/// binning kernel branch-free when a position strays outside the range,
/// e.g. a ghost particle sitting one cell beyond the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRegion {
    /// World-space origin of the global index space.
    pub origin: [f32; 3],
    /// Reciprocal cell size per axis.
    pub inv_cell_size: [f32; 3],
    /// Lower cell index of this region in the global index space.
    pub lo: [i32; 3],
    /// Number of cells per axis.
    pub dims: [u32; 3],
}

impl GridRegion {
    /// Total number of cells in the region.
    pub fn total_cells(&self) -> usize {
        (self.dims[0] as usize) * (self.dims[1] as usize) * (self.dims[2] as usize)
    }

    /// Local cell coordinates of a position, clamped into the region.
    #[inline]
    pub fn cell_coords(&self, px: f32, py: f32, pz: f32) -> [i32; 3] {
        let cx = ((px - self.origin[0]) * self.inv_cell_size[0]).floor() as i32 - self.lo[0];
        let cy = ((py - self.origin[1]) * self.inv_cell_size[1]).floor() as i32 - self.lo[1];
        let cz = ((pz - self.origin[2]) * self.inv_cell_size[2]).floor() as i32 - self.lo[2];
        [
            cx.clamp(0, self.dims[0] as i32 - 1),
            cy.clamp(0, self.dims[1] as i32 - 1),
            cz.clamp(0, self.dims[2] as i32 - 1),
        ]
    }

    /// Flat cell index from local cell coordinates.
    #[inline]
    pub fn flat_index(&self, c: [i32; 3]) -> u32 {
        (c[0] as u32 * self.dims[1] + c[1] as u32) * self.dims[2] + c[2] as u32
    }
}

/// Cell list for one sub-domain, rebuilt every step.
///
/// `permutation` is a bijection on `[0, n)`: for any cell `c`, entries
/// `permutation[offsets[c]..offsets[c+1]]` are exactly the particles whose
/// cell id is `c`. The relative order within a cell is unspecified on the
/// device path (atomic slot claims) and should never be relied upon.
#[derive(Debug, Clone, Default)]
pub struct CellList {
    /// Cell id for each particle (parallel to the particle arrays).
    pub cells: Vec<u32>,
    /// Number of particles in each cell.
    pub counts: Vec<u32>,
    /// Exclusive-prefix start offsets, length `total_cells + 1`;
    /// the final entry equals the particle count.
    pub offsets: Vec<u32>,
    /// Particle indices reordered by cell.
    pub permutation: Vec<u32>,
}

impl CellList {
    /// Build the cell list for `n` particles over `region`.
    ///
    /// The three slices must all have the same length (one entry per
    /// particle, ghosts included).
    pub fn build(region: &GridRegion, x: &[f32], y: &[f32], z: &[f32]) -> Self {
        let n = x.len();
        debug_assert_eq!(n, y.len());
        debug_assert_eq!(n, z.len());

        let total_cells = region.total_cells();

        // --- 1. Compute cell id for each particle and count per cell ---
        let mut cells = Vec::with_capacity(n);
        let mut counts = vec![0u32; total_cells];
        for i in 0..n {
            let c = region.flat_index(region.cell_coords(x[i], y[i], z[i]));
            cells.push(c);
            counts[c as usize] += 1;
        }

        // --- 2. Exclusive prefix sum over counts ---
        let mut offsets = vec![0u32; total_cells + 1];
        let mut running = 0u32;
        for c in 0..total_cells {
            offsets[c] = running;
            running += counts[c];
        }
        offsets[total_cells] = running;

        // --- 3. Claim slots and scatter particle indices ---
        let mut cursors: Vec<u32> = offsets[..total_cells].to_vec();
        let mut permutation = vec![0u32; n];
        for i in 0..n {
            let c = cells[i] as usize;
            permutation[cursors[c] as usize] = i as u32;
            cursors[c] += 1;
        }

        CellList {
            cells,
            counts,
            offsets,
            permutation,
        }
    }

    /// Particle indices binned into cell `c`.
    pub fn cell_members(&self, c: u32) -> &[u32] {
        let start = self.offsets[c as usize] as usize;
        let stop = self.offsets[c as usize + 1] as usize;
        &self.permutation[start..stop]
    }
}
