//! Destination-sorted particle migration.
//!
//! Classifies every particle by the halo region containing its cell, sorts
//! the particle storage by that code, locates each code's contiguous run by
//! binary search, and append-copies the runs into the neighbor sub-domains'
//! buffers. Same-process destinations are copied directly; cross-process
//! destinations go through the [`Transport`] seam.

use std::fmt;

use kernel::{ParticleArrays, ParticleTile};

use crate::decomposition::Decomposition;
use crate::halo::{DecompositionArtifacts, NeighborMask};

/// Migration failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// A particle run must be sent to a sub-domain owned by another
    /// process, and the configured transport cannot deliver it. Dropping
    /// the particles instead would silently corrupt the simulation, so
    /// this is fatal.
    RemoteUnsupported {
        /// Owner of the destination sub-domain.
        dest_proc: u32,
        /// Destination sub-domain id.
        dest_grid: usize,
    },
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::RemoteUnsupported {
                dest_proc,
                dest_grid,
            } => write!(
                f,
                "cross-process migration to sub-domain {dest_grid} (proc {dest_proc}) \
                 is not implemented by this transport"
            ),
        }
    }
}

impl std::error::Error for MigrationError {}

/// Delivery of particle runs to sub-domains owned by other processes.
///
/// The wire format and ordering guarantees of remote transfer are left to
/// implementations; the default [`NoTransport`] refuses them outright.
pub trait Transport {
    /// Deliver particles `[start, stop)` of `src` to `dest_grid`, owned by
    /// `dest_proc`.
    fn send(
        &mut self,
        dest_proc: u32,
        dest_grid: usize,
        src: &ParticleArrays,
        start: usize,
        stop: usize,
    ) -> Result<(), MigrationError>;
}

/// The no-network transport: every remote send fails fatally.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransport;

impl Transport for NoTransport {
    fn send(
        &mut self,
        dest_proc: u32,
        dest_grid: usize,
        _src: &ParticleArrays,
        _start: usize,
        _stop: usize,
    ) -> Result<(), MigrationError> {
        Err(MigrationError::RemoteUnsupported {
            dest_proc,
            dest_grid,
        })
    }
}

/// Per-sub-domain outcome of one migration pass, for the diagnostic report.
#[derive(Debug, Clone)]
pub struct GridMigration {
    /// Sub-domain id.
    pub grid: usize,
    /// `(particle count, neighbor ids)` per halo region, in region order.
    pub regions: Vec<(usize, Vec<usize>)>,
}

/// Human-readable per-sub-domain report: for each halo region, the
/// contributing neighbor ids and the particle count sorted into it.
/// A debugging surface, not a stable machine interface.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// One entry per migrated sub-domain.
    pub grids: Vec<GridMigration>,
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for g in &self.grids {
            writeln!(f, "Grid {} has", g.grid)?;
            for (count, nbors) in &g.regions {
                write!(f, "\t{count} particles for grids ")?;
                for n in nbors {
                    write!(f, "{n} ")?;
                }
                writeln!(f)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Classify every real particle of `tile` by halo code and stable-sort the
/// storage by that code. Returns the sorted codes.
///
/// Codes range over `[-1, num_regions)`: the interior sentinel sorts first.
/// Reordering the particle storage is an intended side effect which callers
/// must tolerate. Ghost particles must have been cleared beforehand.
pub fn sort_by_halo_code(
    tile: &mut ParticleTile,
    mask: &NeighborMask,
    decomp: &Decomposition,
) -> Vec<i32> {
    assert_eq!(
        tile.num_neighbors(),
        0,
        "ghosts must be cleared before migration sorting"
    );
    let n = tile.num_real();
    let p = &tile.particles;

    let mut codes: Vec<i32> = (0..n)
        .map(|i| {
            let iv = decomp.geom.cell_of(p.x[i], p.y[i], p.z[i]);
            mask.get_clamped(iv)
        })
        .collect();

    // Stable sort-by-key: permutation first, then gather every field.
    let mut perm: Vec<usize> = (0..n).collect();
    perm.sort_by_key(|&i| codes[i]);
    tile.particles.gather(&perm);
    codes.sort_unstable();
    codes
}

/// Locate the contiguous run of particles carrying each halo code.
///
/// Returns `(start, stop)` per code in `[0, num_regions)`; interior
/// particles (code `-1`) are deliberately absent.
pub fn code_runs(codes: &[i32], num_regions: usize) -> Vec<(usize, usize)> {
    (0..num_regions as i32)
        .map(|code| {
            let start = codes.partition_point(|&c| c < code);
            let stop = codes.partition_point(|&c| c <= code);
            (start, stop)
        })
        .collect()
}

/// Run one migration pass over every sub-domain owned by `my_proc`.
///
/// Ghost buffers are cleared first; each owned tile is then sorted by halo
/// code and every non-interior run is copied to every neighbor recorded for
/// its region. Local destinations are appended directly as ghost particles;
/// remote destinations are handed to `transport`. Any transport failure
/// aborts the pass.
pub fn migrate(
    decomp: &Decomposition,
    artifacts: &DecompositionArtifacts,
    tiles: &mut [ParticleTile],
    my_proc: u32,
    transport: &mut dyn Transport,
) -> Result<MigrationReport, MigrationError> {
    let owned = decomp.owned_by(my_proc);

    // All destination buffers start the step empty of ghosts.
    for &gid in &owned {
        tiles[gid].clear_neighbors();
    }

    // Sort each owned tile and locate its code runs. Sorting everywhere
    // before any copy keeps destination appends from disturbing source
    // runs.
    let mut runs_per_grid = Vec::with_capacity(owned.len());
    for &gid in &owned {
        let codes = sort_by_halo_code(&mut tiles[gid], &artifacts.masks[gid], decomp);
        let runs = code_runs(&codes, artifacts.regions[gid].len());
        runs_per_grid.push(runs);
    }

    let mut report = MigrationReport::default();
    for (&gid, runs) in owned.iter().zip(&runs_per_grid) {
        let mut grid_report = GridMigration {
            grid: gid,
            regions: Vec::with_capacity(runs.len()),
        };
        for (code, &(start, stop)) in runs.iter().enumerate() {
            let region = &artifacts.regions[gid][code];
            grid_report.regions.push((stop - start, region.neighbors.clone()));
            if start == stop {
                continue;
            }
            for &dst_grid in &region.neighbors {
                let dest_proc = decomp.owner_of(dst_grid);
                if dest_proc == my_proc {
                    let (src, dst) = two_tiles(tiles, gid, dst_grid);
                    dst.append_neighbors(&src.particles, start, stop);
                } else {
                    transport.send(dest_proc, dst_grid, &tiles[gid].particles, start, stop)?;
                }
            }
        }
        tracing::debug!(
            "sub-domain {gid}: {} particles sorted into {} halo regions",
            tiles[gid].num_real(),
            runs.len()
        );
        report.grids.push(grid_report);
    }
    Ok(report)
}

/// Split-borrow two distinct tiles mutably.
fn two_tiles(tiles: &mut [ParticleTile], a: usize, b: usize) -> (&mut ParticleTile, &mut ParticleTile) {
    assert_ne!(a, b, "a sub-domain never migrates to itself");
    if a < b {
        let (head, tail) = tiles.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = tiles.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::DomainGeometry;
    use crate::halo::INTERIOR;

    fn midplane(periodic: [bool; 3], num_procs: u32) -> (Decomposition, DecompositionArtifacts) {
        let geom = DomainGeometry::new([0.0; 3], [1.0; 3], [10; 3], periodic);
        let decomp = Decomposition::split(geom, [2, 1, 1], num_procs);
        let artifacts = DecompositionArtifacts::build(&decomp);
        (decomp, artifacts)
    }

    fn tile_with(positions: &[[f32; 3]]) -> ParticleTile {
        let mut t = ParticleTile::new();
        for (i, p) in positions.iter().enumerate() {
            t.push_real(*p, [0.0; 3], i as u64, 0);
        }
        t
    }

    #[test]
    fn codes_sort_interior_first() {
        let (decomp, artifacts) = midplane([false, true, true], 1);
        // Two interior particles, one in the x-high ghost face of grid 0.
        let mut tile = tile_with(&[[0.45, 0.55, 0.55], [0.25, 0.5, 0.5], [0.25, 0.4, 0.4]]);
        let codes = sort_by_halo_code(&mut tile, &artifacts.masks[0], &decomp);

        assert_eq!(codes.len(), 3);
        assert_eq!(codes[0], INTERIOR);
        assert_eq!(codes[1], INTERIOR);
        assert!(codes[2] >= 0);
        // The boundary particle was sorted to the back of the storage.
        assert!((tile.particles.x[2] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn code_runs_partition_sorted_codes() {
        let codes = vec![-1, -1, 0, 0, 0, 2, 5, 5];
        let runs = code_runs(&codes, 6);
        assert_eq!(runs[0], (2, 5));
        assert_eq!(runs[1], (5, 5));
        assert_eq!(runs[2], (5, 6));
        assert_eq!(runs[3], (6, 6));
        assert_eq!(runs[4], (6, 6));
        assert_eq!(runs[5], (6, 8));
        // Interior particles never appear in any run.
        for &(start, stop) in &runs {
            assert!(start >= 2 && stop <= codes.len());
        }
    }

    #[test]
    fn local_migration_copies_boundary_runs() {
        let (decomp, artifacts) = midplane([false, true, true], 1);
        let mut tiles = vec![
            // Grid 0: one interior particle, one against the midplane.
            tile_with(&[[0.25, 0.5, 0.5], [0.499, 0.5, 0.5]]),
            // Grid 1: one particle against the midplane from the right.
            tile_with(&[[0.501, 0.5, 0.5]]),
        ];

        let report = migrate(&decomp, &artifacts, &mut tiles, 0, &mut NoTransport).unwrap();

        // Grid 0's midplane particle became a ghost in grid 1, and vice
        // versa. Interior particles were not copied anywhere.
        assert_eq!(tiles[1].num_neighbors(), 1);
        assert!((tiles[1].particles.x[1] - 0.499).abs() < 1e-6);
        assert_eq!(tiles[0].num_neighbors(), 1);
        assert!((tiles[0].particles.x[2] - 0.501).abs() < 1e-6);
        assert_eq!(tiles[0].num_real(), 2);
        assert_eq!(tiles[1].num_real(), 1);

        // The report accounts for exactly one particle per exchanged
        // region and names the right destination.
        let g0 = &report.grids[0];
        let moved: Vec<_> = g0.regions.iter().filter(|(c, _)| *c > 0).collect();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].1, vec![1]);
    }

    #[test]
    fn repeated_migration_does_not_accumulate_ghosts() {
        let (decomp, artifacts) = midplane([false, true, true], 1);
        let mut tiles = vec![
            tile_with(&[[0.499, 0.5, 0.5]]),
            tile_with(&[[0.75, 0.5, 0.5]]),
        ];

        for _ in 0..3 {
            migrate(&decomp, &artifacts, &mut tiles, 0, &mut NoTransport).unwrap();
            assert_eq!(tiles[1].num_neighbors(), 1, "ghosts must be rebuilt, not stacked");
        }
    }

    #[test]
    fn remote_destination_is_fatal_without_transport() {
        // Two procs: grid 0 -> proc 0, grid 1 -> proc 1.
        let (decomp, artifacts) = midplane([false, true, true], 2);
        let mut tiles = vec![
            tile_with(&[[0.499, 0.5, 0.5]]),
            ParticleTile::new(),
        ];

        let err = migrate(&decomp, &artifacts, &mut tiles, 0, &mut NoTransport).unwrap_err();
        assert_eq!(
            err,
            MigrationError::RemoteUnsupported {
                dest_proc: 1,
                dest_grid: 1
            }
        );
    }

    #[test]
    fn out_of_range_particle_is_clamped_into_the_mask() {
        let (decomp, artifacts) = midplane([false, true, true], 1);
        // A particle that drifted past grid 0's high edge (a missed
        // migration) classifies by its nearest cell: the x-high face.
        let mut tile = tile_with(&[[0.55, 0.5, 0.5]]);
        let codes = sort_by_halo_code(&mut tile, &artifacts.masks[0], &decomp);
        assert!(codes[0] >= 0);
    }
}
