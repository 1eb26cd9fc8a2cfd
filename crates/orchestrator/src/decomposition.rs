//! Domain decomposition: axis-aligned sub-domain boxes in cell-index space,
//! an owner map, and box-intersection queries (periodic images included).
//!
//! The decomposition is the oracle the halo and migration layers consume:
//! sub-domains tile the simulation domain without gaps and are immutable for
//! the lifetime of a decomposition.

/// A cell-index vector.
pub type IntVect = [i32; 3];

/// An axis-aligned box of cells, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Box3 {
    /// Lower corner (inclusive).
    pub lo: IntVect,
    /// Upper corner (inclusive).
    pub hi: IntVect,
}

impl Box3 {
    /// Construct a box from inclusive corners.
    pub fn new(lo: IntVect, hi: IntVect) -> Self {
        Self { lo, hi }
    }

    /// Number of cells along `axis`.
    pub fn length(&self, axis: usize) -> i32 {
        self.hi[axis] - self.lo[axis] + 1
    }

    /// Total number of cells.
    pub fn num_cells(&self) -> usize {
        (0..3).map(|a| self.length(a).max(0) as usize).product()
    }

    /// Whether `iv` lies inside the box.
    pub fn contains(&self, iv: IntVect) -> bool {
        (0..3).all(|a| iv[a] >= self.lo[a] && iv[a] <= self.hi[a])
    }

    /// Intersection with another box, or `None` if disjoint.
    pub fn intersect(&self, other: &Box3) -> Option<Box3> {
        let mut lo = [0i32; 3];
        let mut hi = [0i32; 3];
        for a in 0..3 {
            lo[a] = self.lo[a].max(other.lo[a]);
            hi[a] = self.hi[a].min(other.hi[a]);
            if lo[a] > hi[a] {
                return None;
            }
        }
        Some(Box3 { lo, hi })
    }

    /// Grow (or shrink, for negative `n`) by `n` cells on every face.
    pub fn grow(&self, n: i32) -> Box3 {
        Box3 {
            lo: [self.lo[0] - n, self.lo[1] - n, self.lo[2] - n],
            hi: [self.hi[0] + n, self.hi[1] + n, self.hi[2] + n],
        }
    }

    /// Translate by `shift` cells.
    pub fn shift(&self, shift: IntVect) -> Box3 {
        Box3 {
            lo: [
                self.lo[0] + shift[0],
                self.lo[1] + shift[1],
                self.lo[2] + shift[2],
            ],
            hi: [
                self.hi[0] + shift[0],
                self.hi[1] + shift[1],
                self.hi[2] + shift[2],
            ],
        }
    }

    /// The `n`-cell-thick slab adjacent to the low face along `axis`.
    pub fn adj_cell_lo(&self, axis: usize, n: i32) -> Box3 {
        let mut lo = self.lo;
        let mut hi = self.hi;
        hi[axis] = self.lo[axis] - 1;
        lo[axis] = self.lo[axis] - n;
        Box3 { lo, hi }
    }

    /// The `n`-cell-thick slab adjacent to the high face along `axis`.
    pub fn adj_cell_hi(&self, axis: usize, n: i32) -> Box3 {
        let mut lo = self.lo;
        let mut hi = self.hi;
        lo[axis] = self.hi[axis] + 1;
        hi[axis] = self.hi[axis] + n;
        Box3 { lo, hi }
    }

    /// Iterate over every cell in the box.
    pub fn cells(&self) -> impl Iterator<Item = IntVect> + '_ {
        let b = *self;
        (b.lo[0]..=b.hi[0]).flat_map(move |i| {
            (b.lo[1]..=b.hi[1])
                .flat_map(move |j| (b.lo[2]..=b.hi[2]).map(move |k| [i, j, k]))
        })
    }
}

/// Domain geometry: the world-space extent, the global cell grid, and
/// per-axis periodicity flags.
#[derive(Debug, Clone)]
pub struct DomainGeometry {
    /// World-space lower corner.
    pub prob_lo: [f32; 3],
    /// World-space upper corner.
    pub prob_hi: [f32; 3],
    /// Cell size per axis.
    pub cell_size: [f32; 3],
    /// Reciprocal cell size per axis.
    pub inv_cell_size: [f32; 3],
    /// Whether each axis wraps periodically.
    pub periodic: [bool; 3],
    /// The full index-space domain.
    pub domain: Box3,
}

impl DomainGeometry {
    /// Build the geometry for a domain of `cells` cells per axis.
    pub fn new(prob_lo: [f32; 3], prob_hi: [f32; 3], cells: [u32; 3], periodic: [bool; 3]) -> Self {
        let mut cell_size = [0.0f32; 3];
        let mut inv_cell_size = [0.0f32; 3];
        for a in 0..3 {
            cell_size[a] = (prob_hi[a] - prob_lo[a]) / cells[a] as f32;
            inv_cell_size[a] = 1.0 / cell_size[a];
        }
        Self {
            prob_lo,
            prob_hi,
            cell_size,
            inv_cell_size,
            periodic,
            domain: Box3::new([0; 3], [cells[0] as i32 - 1, cells[1] as i32 - 1, cells[2] as i32 - 1]),
        }
    }

    /// Global cell index containing a position (unclamped).
    pub fn cell_of(&self, px: f32, py: f32, pz: f32) -> IntVect {
        [
            ((px - self.prob_lo[0]) * self.inv_cell_size[0]).floor() as i32 + self.domain.lo[0],
            ((py - self.prob_lo[1]) * self.inv_cell_size[1]).floor() as i32 + self.domain.lo[1],
            ((pz - self.prob_lo[2]) * self.inv_cell_size[2]).floor() as i32 + self.domain.lo[2],
        ]
    }

    /// All periodic shift vectors: every combination of `{-L, 0, +L}` per
    /// periodic axis (zero shift included), `{0}` on non-periodic axes.
    pub fn periodic_shifts(&self) -> Vec<IntVect> {
        let options = |a: usize| -> Vec<i32> {
            if self.periodic[a] {
                let len = self.domain.length(a);
                vec![-len, 0, len]
            } else {
                vec![0]
            }
        };
        let (xs, ys, zs) = (options(0), options(1), options(2));
        let mut shifts = Vec::with_capacity(xs.len() * ys.len() * zs.len());
        for &sx in &xs {
            for &sy in &ys {
                for &sz in &zs {
                    shifts.push([sx, sy, sz]);
                }
            }
        }
        shifts
    }
}

/// An ordered collection of sub-domain boxes plus their owner map.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// The domain geometry.
    pub geom: DomainGeometry,
    boxes: Vec<Box3>,
    owners: Vec<u32>,
}

impl Decomposition {
    /// Split the domain into a `splits[0] x splits[1] x splits[2]` grid of
    /// sub-domains, assigning owners round-robin over `num_procs` ranks.
    ///
    /// Remainder cells go to the leading chunks so the split always tiles
    /// the domain exactly.
    pub fn split(geom: DomainGeometry, splits: [u32; 3], num_procs: u32) -> Self {
        // Per-axis chunk boundaries.
        let bounds = |a: usize| -> Vec<(i32, i32)> {
            let len = geom.domain.length(a);
            let k = splits[a] as i32;
            let base = len / k;
            let extra = len % k;
            let mut out = Vec::with_capacity(k as usize);
            let mut lo = geom.domain.lo[a];
            for c in 0..k {
                let size = base + i32::from(c < extra);
                out.push((lo, lo + size - 1));
                lo += size;
            }
            out
        };
        let (xs, ys, zs) = (bounds(0), bounds(1), bounds(2));

        let mut boxes = Vec::with_capacity((splits[0] * splits[1] * splits[2]) as usize);
        for &(xl, xh) in &xs {
            for &(yl, yh) in &ys {
                for &(zl, zh) in &zs {
                    boxes.push(Box3::new([xl, yl, zl], [xh, yh, zh]));
                }
            }
        }
        let owners = (0..boxes.len()).map(|i| i as u32 % num_procs).collect();

        tracing::debug!(
            "Decomposition: {} sub-domains over {} procs",
            boxes.len(),
            num_procs
        );
        Self { geom, boxes, owners }
    }

    /// Number of sub-domains.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Whether the decomposition is empty.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// The box of sub-domain `id`.
    pub fn bounds(&self, id: usize) -> &Box3 {
        &self.boxes[id]
    }

    /// The rank owning sub-domain `id`.
    pub fn owner_of(&self, id: usize) -> u32 {
        self.owners[id]
    }

    /// Iterate over `(id, box)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Box3)> {
        self.boxes.iter().enumerate()
    }

    /// Ids of the sub-domains owned by `proc`.
    pub fn owned_by(&self, proc: u32) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.owners[i] == proc).collect()
    }

    /// Sub-domains whose box, grown by `ghost` cells, intersects `query`.
    ///
    /// Returns `(id, intersection)` pairs. `exclude` drops one id from the
    /// results (callers pass their own id to skip self-intersections).
    pub fn intersections(
        &self,
        query: &Box3,
        exclude: Option<usize>,
        ghost: i32,
    ) -> Vec<(usize, Box3)> {
        self.boxes
            .iter()
            .enumerate()
            .filter(|(id, _)| Some(*id) != exclude)
            .filter_map(|(id, b)| b.grow(ghost).intersect(query).map(|isec| (id, isec)))
            .collect()
    }
}
