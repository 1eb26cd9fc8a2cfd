//! Boundary-region decomposition: partition each sub-domain's 1-cell ghost
//! layer into disjoint sub-regions, each tagged with the set of neighboring
//! sub-domains whose data must be exchanged there, plus the per-cell mask
//! used to classify particles during migration.
//!
//! Rebuilt whenever the decomposition changes; read-only afterwards and
//! shared by every step.

use std::collections::BTreeSet;

use crate::decomposition::{Box3, Decomposition, IntVect};

/// Mask value for cells outside every halo region.
pub const INTERIOR: i32 = -1;

/// One sub-box of a sub-domain's boundary layer, tagged with the ids of the
/// neighbor sub-domains that overlap it (periodic images unwrapped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaloRegion {
    /// The cells this region covers.
    pub bounds: Box3,
    /// Contributing neighbor sub-domain ids, sorted and deduplicated.
    pub neighbors: Vec<usize>,
}

/// Per-sub-domain scalar field over its cell range: the halo-region index
/// containing each cell, or [`INTERIOR`].
#[derive(Debug, Clone)]
pub struct NeighborMask {
    bounds: Box3,
    data: Vec<i32>,
}

impl NeighborMask {
    /// A mask over `bounds` with every cell marked interior.
    pub fn new(bounds: Box3) -> Self {
        Self {
            data: vec![INTERIOR; bounds.num_cells()],
            bounds,
        }
    }

    /// The cell range this mask covers.
    pub fn bounds(&self) -> &Box3 {
        &self.bounds
    }

    fn offset(&self, iv: IntVect) -> usize {
        let nx = [
            iv[0] - self.bounds.lo[0],
            iv[1] - self.bounds.lo[1],
            iv[2] - self.bounds.lo[2],
        ];
        (nx[0] as usize * self.bounds.length(1) as usize + nx[1] as usize)
            * self.bounds.length(2) as usize
            + nx[2] as usize
    }

    /// Mask value at `iv`, which must lie inside the bounds.
    pub fn get(&self, iv: IntVect) -> i32 {
        debug_assert!(self.bounds.contains(iv));
        self.data[self.offset(iv)]
    }

    /// Mask value at `iv`, clamping out-of-range coordinates into the
    /// bounds first. A position outside the expected range (e.g. a missed
    /// migration) is classified by its nearest cell rather than rejected.
    pub fn get_clamped(&self, iv: IntVect) -> i32 {
        let clamped = [
            iv[0].clamp(self.bounds.lo[0], self.bounds.hi[0]),
            iv[1].clamp(self.bounds.lo[1], self.bounds.hi[1]),
            iv[2].clamp(self.bounds.lo[2], self.bounds.hi[2]),
        ];
        self.data[self.offset(clamped)]
    }

    /// Set every cell of `b` (which must lie inside the bounds) to `value`.
    pub fn set_box(&mut self, b: &Box3, value: i32) {
        for iv in b.cells() {
            let o = self.offset(iv);
            self.data[o] = value;
        }
    }
}

/// Enumerate the boundary layer adjacent to `bx` as face, edge, and corner
/// sub-boxes, each `ncells` thick, deduplicated by exact equality.
///
/// Every derivation order of the same geometric box (a corner is reachable
/// through six face/edge paths) collapses to a single entry, so the result
/// is independent of iteration order.
pub fn boundary_boxes(bx: &Box3, ncells: i32) -> Vec<Box3> {
    for a in 0..3 {
        assert!(
            bx.length(a) > 2 * ncells,
            "sub-domain axis {a} too small for a {ncells}-cell boundary decomposition"
        );
    }

    let mut bl: Vec<Box3> = Vec::new();
    let push = |bl: &mut Vec<Box3>, b: Box3| {
        if !bl.contains(&b) {
            bl.push(b);
        }
    };

    for i in 0..3 {
        let faces = [bx.adj_cell_hi(i, ncells), bx.adj_cell_lo(i, ncells)];
        for &face in &faces {
            push(&mut bl, face);
            for j in 0..3 {
                if j == i {
                    continue;
                }
                let edges = [face.adj_cell_hi(j, ncells), face.adj_cell_lo(j, ncells)];
                for &edge in &edges {
                    push(&mut bl, edge);
                    for k in 0..3 {
                        if k == i || k == j {
                            continue;
                        }
                        push(&mut bl, edge.adj_cell_hi(k, ncells));
                        push(&mut bl, edge.adj_cell_lo(k, ncells));
                    }
                }
            }
        }
    }
    bl
}

/// Halo regions and neighbor masks for every sub-domain of a decomposition.
///
/// Constructed once per decomposition and passed by reference to every
/// per-step operation; pure and re-entrant, so callers simply rebuild it
/// when the decomposition changes.
#[derive(Debug, Clone)]
pub struct DecompositionArtifacts {
    /// Ordered halo regions per sub-domain id.
    pub regions: Vec<Vec<HaloRegion>>,
    /// Neighbor mask per sub-domain id.
    pub masks: Vec<NeighborMask>,
}

impl DecompositionArtifacts {
    /// Decompose the boundary layer of every sub-domain.
    pub fn build(decomp: &Decomposition) -> Self {
        let shifts = decomp.geom.periodic_shifts();
        let mut regions = Vec::with_capacity(decomp.len());
        let mut masks = Vec::with_capacity(decomp.len());

        for (grid, bx) in decomp.iter() {
            // Candidate neighbor contributions: every sub-domain whose
            // 1-cell-grown box intersects a periodic image of this one,
            // with the intersection translated back by the shift.
            // Deduplicated exactly; a neighbor never includes itself.
            let mut candidates: BTreeSet<(usize, Box3)> = BTreeSet::new();
            for &shift in &shifts {
                let query = bx.shift(shift);
                for (nbor, isec) in decomp.intersections(&query, Some(grid), 1) {
                    candidates.insert((nbor, isec.shift([-shift[0], -shift[1], -shift[2]])));
                }
            }

            let sub_boxes = boundary_boxes(&bx.grow(-1), 1);
            let mut mask = NeighborMask::new(*bx);
            let mut grid_regions: Vec<HaloRegion> = Vec::new();

            for b in sub_boxes {
                let nbors: BTreeSet<usize> = candidates
                    .iter()
                    .filter(|(_, cand)| b.intersect(cand).is_some())
                    .map(|(nbor, _)| *nbor)
                    .collect();
                // A boundary sub-box with no overlapping owner (a physical
                // domain edge with no periodic wrap) stays unmarked.
                if nbors.is_empty() {
                    continue;
                }
                mask.set_box(&b, grid_regions.len() as i32);
                grid_regions.push(HaloRegion {
                    bounds: b,
                    neighbors: nbors.into_iter().collect(),
                });
            }

            tracing::debug!(
                "sub-domain {grid}: {} halo regions, {} neighbor candidates",
                grid_regions.len(),
                candidates.len()
            );
            regions.push(grid_regions);
            masks.push(mask);
        }

        Self { regions, masks }
    }
}
