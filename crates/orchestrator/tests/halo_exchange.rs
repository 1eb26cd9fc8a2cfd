//! End-to-end halo exchange over the midplane scenario: a unit cube split
//! in two along x, periodic on y and z, cutoff = cell size = 0.1.

use kernel::{CpuIndex, ParticleTile, SpatialIndex};
use orchestrator::config::{BackendType, DomainBounds, SimulationConfig};
use orchestrator::{
    migrate, region_for, Decomposition, DecompositionArtifacts, DomainGeometry, NoTransport,
    Simulation,
};

fn midplane_config() -> SimulationConfig {
    SimulationConfig {
        name: "midplane".to_string(),
        domain: DomainBounds {
            min: [0.0; 3],
            max: [1.0; 3],
        },
        cells: [10; 3],
        splits: [2, 1, 1],
        num_procs: 1,
        periodic: [false, true, true],
        cutoff: 0.1,
        min_pair_distance: 1.0e-4,
        mass: 1.0,
        dt: 1.0e-3,
        max_timesteps: None,
        particles_per_cell: [1, 1, 1],
        thermal_momentum_mean: 0.0,
        thermal_momentum_std: 0.1,
        seed: 42,
        backend: BackendType::Cpu,
    }
}

#[test]
fn midplane_particle_becomes_a_ghost_and_a_partner() {
    let geom = DomainGeometry::new([0.0; 3], [1.0; 3], [10; 3], [false, true, true]);
    let decomp = Decomposition::split(geom, [2, 1, 1], 1);
    let artifacts = DecompositionArtifacts::build(&decomp);

    // One particle on each side of the midplane, within cutoff of each
    // other, plus an interior particle that must go nowhere.
    let mut tiles = vec![ParticleTile::new(), ParticleTile::new()];
    tiles[0].push_real([0.499, 0.55, 0.55], [0.0; 3], 10, 0);
    tiles[0].push_real([0.25, 0.25, 0.25], [0.0; 3], 11, 0);
    tiles[1].push_real([0.501, 0.55, 0.55], [0.0; 3], 20, 0);

    migrate(&decomp, &artifacts, &mut tiles, 0, &mut NoTransport).unwrap();

    // The boundary particles crossed over as ghosts; the interior one did
    // not.
    assert_eq!(tiles[1].num_neighbors(), 1);
    assert_eq!(tiles[1].particles.id[1], 10);
    assert_eq!(tiles[0].num_neighbors(), 1);
    assert_eq!(tiles[0].particles.id[2], 20);

    // Rebuilding sub-domain 1's index over real + ghost particles pairs
    // its real particle with the ghost.
    let mut index = CpuIndex::new(region_for(&decomp.geom, decomp.bounds(1)), 0.1);
    let p = &tiles[1].particles;
    index.rebuild(&p.x, &p.y, &p.z);
    assert_eq!(index.neighbor_list().neighbors_of(0), &[1]);
    assert_eq!(index.neighbor_list().neighbors_of(1), &[0]);
}

#[test]
fn y_periodic_wrap_delivers_the_ghost() {
    // Split along y with y periodic: a particle at y = 0.001 lives in the
    // halo region tagged with the sub-domain reached by wrapping y to the
    // far side, and migration copies it there.
    let geom = DomainGeometry::new([0.0; 3], [1.0; 3], [10; 3], [false, true, false]);
    let decomp = Decomposition::split(geom, [1, 2, 1], 1);
    let artifacts = DecompositionArtifacts::build(&decomp);

    let mut tiles = vec![ParticleTile::new(), ParticleTile::new()];
    tiles[0].push_real([0.5, 0.001, 0.5], [0.0; 3], 1, 0);

    migrate(&decomp, &artifacts, &mut tiles, 0, &mut NoTransport).unwrap();

    assert_eq!(tiles[1].num_neighbors(), 1, "wrapped ghost must arrive");
    assert_eq!(tiles[1].particles.id[0], 1);
}

#[test]
fn cross_boundary_pairs_are_mirrored_between_sub_domains() {
    let mut sim = Simulation::new(&midplane_config(), 0).unwrap();
    sim.step().unwrap();

    // For every (real, ghost) pair in sub-domain 0, the mirrored pair must
    // exist in the sub-domain that owns the ghost: match particles by id,
    // since migration reorders storage.
    let t0 = sim.tile(0);
    let t1 = sim.tile(1);
    let l0 = sim.neighbor_list(0);
    let l1 = sim.neighbor_list(1);

    let find_by_id = |tile: &ParticleTile, id: u64| -> Option<usize> {
        tile.particles.id.iter().position(|&p| p == id)
    };

    let mut cross_pairs = 0;
    for i in 0..t0.num_real() {
        for &j in l0.neighbors_of(i) {
            let j = j as usize;
            if j < t0.num_real() {
                continue;
            }
            cross_pairs += 1;
            let ghost_id = t0.particles.id[j];
            let real_id = t0.particles.id[i];

            // The ghost is a copy of a real particle in sub-domain 1,
            // which must list a ghost copy of our real particle.
            let owner_idx = find_by_id(t1, ghost_id).expect("ghost with no owner");
            assert!(owner_idx < t1.num_real(), "ghost id maps to another ghost");
            let mirrored = l1
                .neighbors_of(owner_idx)
                .iter()
                .any(|&k| t1.particles.id[k as usize] == real_id);
            assert!(mirrored, "pair ({real_id}, {ghost_id}) has no mirror");
        }
    }
    assert!(cross_pairs > 0, "midplane lattice must produce cross pairs");
}

#[test]
fn migration_report_names_the_exchange_partners() {
    let mut sim = Simulation::new(&midplane_config(), 0).unwrap();
    let report = sim.step().unwrap();

    assert_eq!(report.grids.len(), 2);
    let rendered = format!("{report}");
    assert!(rendered.contains("Grid 0 has"));
    assert!(rendered.contains("Grid 1 has"));

    // Each sub-domain moved at least one boundary run to the other.
    for g in &report.grids {
        let moved: usize = g.regions.iter().map(|(count, _)| count).sum();
        assert!(moved > 0, "grid {} exchanged nothing", g.grid);
        for (count, nbors) in &g.regions {
            if *count > 0 {
                assert!(!nbors.is_empty());
            }
        }
    }
}

#[test]
fn repeated_steps_keep_the_exchange_stable() {
    let mut sim = Simulation::new(&midplane_config(), 0).unwrap();
    let initial = sim.total_real_particles();

    for _ in 0..5 {
        sim.step().unwrap();
        assert_eq!(sim.total_real_particles(), initial);

        // Ghost buffers are rebuilt per step, never accumulated.
        for gid in 0..2 {
            let tile = sim.tile(gid);
            assert!(
                tile.num_neighbors() <= initial,
                "ghost count diverged in sub-domain {gid}"
            );
        }
    }
}
