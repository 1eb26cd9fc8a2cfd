//! Pairwise force evaluation over the neighbor list, and time integration
//! with reflecting domain walls. Straightforward consumers of the spatial
//! index; the interesting work happens upstream.

use kernel::{NeighborList, ParticleTile};

/// Parameters of the short-range pair force.
#[derive(Debug, Clone, Copy)]
pub struct ForceParams {
    /// Interaction cutoff radius.
    pub cutoff: f32,
    /// Minimum pair distance; closer pairs are evaluated at this distance
    /// to keep the coefficient finite.
    pub min_r: f32,
    /// Particle mass.
    pub mass: f32,
}

/// Accumulate accelerations for the real particles of `tile` from the
/// neighbor list. Ghost partners contribute to real particles but receive
/// no update of their own; their accelerations are discarded at the next
/// exchange.
pub fn compute_forces(tile: &mut ParticleTile, list: &NeighborList, params: &ForceParams) {
    let n = tile.num_real();
    let p = &mut tile.particles;

    for i in 0..n {
        p.ax[i] = 0.0;
        p.ay[i] = 0.0;
        p.az[i] = 0.0;

        let start = list.offsets[i] as usize;
        let stop = list.offsets[i + 1] as usize;
        for &j in &list.indices[start..stop] {
            let j = j as usize;
            let dx = p.x[i] - p.x[j];
            let dy = p.y[i] - p.y[j];
            let dz = p.z[i] - p.z[j];

            let r2 = (dx * dx + dy * dy + dz * dz).max(params.min_r * params.min_r);
            let r = r2.sqrt();

            let coef = (1.0 - params.cutoff / r) / r2 / params.mass;
            p.ax[i] += coef * dx;
            p.ay[i] += coef * dy;
            p.az[i] += coef * dz;
        }
    }
}

/// Advance the real particles of `tile` by `dt`: velocity update, position
/// drift, then reflection at the domain walls (position mirrored, velocity
/// component flipped). A particle can reflect more than once in one step if
/// it overshoots a wall by more than the domain extent.
pub fn move_particles(tile: &mut ParticleTile, dt: f32, prob_lo: [f32; 3], prob_hi: [f32; 3]) {
    let n = tile.num_real();
    let p = &mut tile.particles;

    for i in 0..n {
        p.vx[i] += p.ax[i] * dt;
        p.vy[i] += p.ay[i] * dt;
        p.vz[i] += p.az[i] * dt;

        p.x[i] += p.vx[i] * dt;
        p.y[i] += p.vy[i] * dt;
        p.z[i] += p.vz[i] * dt;

        for axis in 0..3 {
            let (pos, vel): (&mut f32, &mut f32) = match axis {
                0 => (&mut p.x[i], &mut p.vx[i]),
                1 => (&mut p.y[i], &mut p.vy[i]),
                _ => (&mut p.z[i], &mut p.vz[i]),
            };
            while *pos < prob_lo[axis] || *pos > prob_hi[axis] {
                if *pos < prob_lo[axis] {
                    *pos = 2.0 * prob_lo[axis] - *pos;
                } else {
                    *pos = 2.0 * prob_hi[axis] - *pos;
                }
                *vel = -*vel;
            }
        }
    }
}
