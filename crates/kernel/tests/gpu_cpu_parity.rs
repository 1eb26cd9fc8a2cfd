//! GPU vs CPU parity for the spatial index.
//!
//! Builds the same particle set on both back-ends and compares cell-list
//! aggregates and per-particle partner multisets. The device permutation's
//! intra-cell order is non-deterministic, so comparisons are always over
//! sorted ranges, never exact index sequences.
//!
//! Gated behind `#[cfg(feature = "gpu")]` and a runtime adapter probe so the
//! suite passes on machines without a GPU.

#![cfg(feature = "gpu")]

use kernel::gpu::{gpu_available, GpuIndex};
use kernel::{CpuIndex, GridRegion, SpatialIndex};

fn sample_positions(n: usize, seed: u64) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (state >> 33) as f32 / (1u64 << 31) as f32
    };
    let x: Vec<f32> = (0..n).map(|_| next()).collect();
    let y: Vec<f32> = (0..n).map(|_| next()).collect();
    let z: Vec<f32> = (0..n).map(|_| next()).collect();
    (x, y, z)
}

#[test]
fn gpu_cpu_index_parity() {
    if !gpu_available() {
        eprintln!("No GPU adapter available; skipping parity test");
        return;
    }

    let region = GridRegion {
        origin: [0.0; 3],
        inv_cell_size: [10.0; 3],
        lo: [0; 3],
        dims: [10; 3],
    };
    let cutoff = 0.1f32;
    let n = 800;
    let (x, y, z) = sample_positions(n, 42);

    let mut cpu = CpuIndex::new(region, cutoff);
    cpu.rebuild(&x, &y, &z);

    let mut gpu = GpuIndex::new(region, cutoff, n).expect("GPU init");
    gpu.rebuild(&x, &y, &z);

    // Cell assignments are deterministic; counts and offsets must agree
    // exactly.
    assert_eq!(gpu.cell_list().cells, cpu.cell_list().cells);
    assert_eq!(gpu.cell_list().counts, cpu.cell_list().counts);
    assert_eq!(gpu.cell_list().offsets, cpu.cell_list().offsets);

    // The permutation may order particles within a cell differently; each
    // cell's member set must match.
    for c in 0..region.total_cells() as u32 {
        let mut a = cpu.cell_list().cell_members(c).to_vec();
        let mut b = gpu.cell_list().cell_members(c).to_vec();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b, "cell {c} member set differs");
    }

    // Neighbor offsets agree exactly; partner lists agree as multisets.
    assert_eq!(gpu.neighbor_list().offsets, cpu.neighbor_list().offsets);
    for i in 0..n {
        let mut a = cpu.neighbor_list().neighbors_of(i).to_vec();
        let mut b = gpu.neighbor_list().neighbors_of(i).to_vec();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b, "particle {i} partner multiset differs");
    }
}

#[test]
fn gpu_index_handles_empty_and_growth() {
    if !gpu_available() {
        eprintln!("No GPU adapter available; skipping parity test");
        return;
    }

    let region = GridRegion {
        origin: [0.0; 3],
        inv_cell_size: [5.0; 3],
        lo: [0; 3],
        dims: [5; 3],
    };
    let mut gpu = GpuIndex::new(region, 0.2, 600).expect("GPU init");

    // Empty set
    gpu.rebuild(&[], &[], &[]);
    assert_eq!(gpu.neighbor_list().total(), 0);
    assert!(gpu.cell_list().offsets.iter().all(|&o| o == 0));

    // Dense cluster: forces the flat-list buffer to grow past its initial
    // capacity (every particle pairs with every other).
    let n = 500;
    let x: Vec<f32> = (0..n).map(|i| 0.5 + (i % 7) as f32 * 1e-4).collect();
    let y = vec![0.5f32; n];
    let z = vec![0.5f32; n];
    gpu.rebuild(&x, &y, &z);
    assert_eq!(gpu.neighbor_list().total(), n * (n - 1));
}
