//! Particle seeding: lattice placement with Gaussian thermal momenta.

use kernel::ParticleTile;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::decomposition::Decomposition;

/// Fractional position of lattice site `i_part` within a unit cell holding
/// `nppc[0] * nppc[1] * nppc[2]` particles.
pub fn position_in_unit_cell(nppc: [u32; 3], i_part: u32) -> [f32; 3] {
    let (nx, ny, nz) = (nppc[0], nppc[1], nppc[2]);
    let ix = i_part / (ny * nz);
    let iy = (i_part % (ny * nz)) % ny;
    let iz = (i_part % (ny * nz)) / ny;
    [
        (0.5 + ix as f32) / nx as f32,
        (0.5 + iy as f32) / ny as f32,
        (0.5 + iz as f32) / nz as f32,
    ]
}

/// Seed every sub-domain owned by `my_proc` with `nppc` particles per cell
/// on a regular lattice, drawing each velocity component from a Gaussian
/// of the given mean and standard deviation.
///
/// Returns one tile per sub-domain (empty for sub-domains owned by other
/// ranks). Ids are unique and monotone within the run; the origin tag
/// records `my_proc`.
pub fn seed_particles(
    decomp: &Decomposition,
    my_proc: u32,
    nppc: [u32; 3],
    momentum_mean: f32,
    momentum_std: f32,
    seed: u64,
) -> Vec<ParticleTile> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let thermal = Normal::new(0.0f32, momentum_std)
        .expect("thermal momentum std must be non-negative and finite");

    let num_ppc = nppc[0] * nppc[1] * nppc[2];
    let geom = &decomp.geom;
    let mut next_id = 0u64;

    let mut tiles = Vec::with_capacity(decomp.len());
    for (grid, bx) in decomp.iter() {
        let mut tile = ParticleTile::new();
        if decomp.owner_of(grid) == my_proc {
            for iv in bx.cells() {
                for i_part in 0..num_ppc {
                    let r = position_in_unit_cell(nppc, i_part);
                    let pos = [
                        geom.prob_lo[0] + (iv[0] as f32 + r[0]) * geom.cell_size[0],
                        geom.prob_lo[1] + (iv[1] as f32 + r[1]) * geom.cell_size[1],
                        geom.prob_lo[2] + (iv[2] as f32 + r[2]) * geom.cell_size[2],
                    ];
                    let vel = [
                        momentum_mean + thermal.sample(&mut rng),
                        momentum_mean + thermal.sample(&mut rng),
                        momentum_mean + thermal.sample(&mut rng),
                    ];
                    tile.push_real(pos, vel, next_id, my_proc);
                    next_id += 1;
                }
            }
            tracing::info!(
                "sub-domain {grid}: seeded {} particles",
                tile.num_real()
            );
        }
        tiles.push(tile);
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::DomainGeometry;

    fn small_decomp() -> Decomposition {
        let geom = DomainGeometry::new([0.0; 3], [1.0; 3], [10; 3], [false; 3]);
        Decomposition::split(geom, [2, 1, 1], 1)
    }

    #[test]
    fn unit_cell_sites_stay_inside_the_cell() {
        let nppc = [2, 3, 2];
        for i in 0..12 {
            let r = position_in_unit_cell(nppc, i);
            for a in 0..3 {
                assert!(r[a] > 0.0 && r[a] < 1.0, "site {i} axis {a} at {}", r[a]);
            }
        }
    }

    #[test]
    fn unit_cell_sites_are_distinct() {
        let nppc = [2, 2, 2];
        let mut sites: Vec<[u32; 3]> = (0..8)
            .map(|i| {
                let r = position_in_unit_cell(nppc, i);
                [(r[0] * 4.0) as u32, (r[1] * 4.0) as u32, (r[2] * 4.0) as u32]
            })
            .collect();
        sites.sort_unstable();
        sites.dedup();
        assert_eq!(sites.len(), 8);
    }

    #[test]
    fn seeding_fills_owned_sub_domains() {
        let decomp = small_decomp();
        let tiles = seed_particles(&decomp, 0, [1, 1, 1], 0.0, 0.1, 42);

        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].num_real(), decomp.bounds(0).num_cells());
        assert_eq!(tiles[1].num_real(), decomp.bounds(1).num_cells());

        // Positions land inside their sub-domain's extent.
        let p = &tiles[0].particles;
        for i in 0..tiles[0].num_real() {
            assert!(p.x[i] > 0.0 && p.x[i] < 0.5);
            assert!(p.y[i] > 0.0 && p.y[i] < 1.0);
        }
    }

    #[test]
    fn ids_are_unique_across_tiles() {
        let decomp = small_decomp();
        let tiles = seed_particles(&decomp, 0, [2, 1, 1], 0.0, 0.1, 7);
        let mut ids: Vec<u64> = tiles
            .iter()
            .flat_map(|t| t.particles.id.iter().copied())
            .collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn seeding_is_deterministic_per_seed() {
        let decomp = small_decomp();
        let a = seed_particles(&decomp, 0, [1, 1, 1], 0.0, 0.1, 9);
        let b = seed_particles(&decomp, 0, [1, 1, 1], 0.0, 0.1, 9);
        assert_eq!(a[0].particles.vx, b[0].particles.vx);

        let c = seed_particles(&decomp, 0, [1, 1, 1], 0.0, 0.1, 10);
        assert_ne!(a[0].particles.vx, c[0].particles.vx);
    }

    #[test]
    fn non_owned_sub_domains_stay_empty() {
        let geom = DomainGeometry::new([0.0; 3], [1.0; 3], [10; 3], [false; 3]);
        let decomp = Decomposition::split(geom, [2, 1, 1], 2);
        let tiles = seed_particles(&decomp, 0, [1, 1, 1], 0.0, 0.1, 42);
        assert!(tiles[0].num_real() > 0);
        assert_eq!(tiles[1].num_real(), 0);
    }
}
