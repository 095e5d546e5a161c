//! Deterministic uniform seeding.
//!
//! Every rank draws the same global sequence from a `ChaCha8Rng` seeded
//! with the same `u64` and keeps the particles whose slab-axis coordinate
//! it owns, so the union over ranks is exactly the global set and no
//! coordination is needed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use slabtrace_core::{ParticleId, Real, StepError};

use crate::redistribute::Redistributor;
use crate::state::ParticleState;

/// The global set: `count` particles uniform in `[0, box_size)`, with ids
/// `0..count`.
pub fn uniform_positions(
    count: u64,
    box_size: [f64; 3],
    seed: u64,
) -> impl Iterator<Item = (ParticleId, [f64; 3])> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(move |id| {
        let x = rng.random::<f64>() * box_size[0];
        let y = rng.random::<f64>() * box_size[1];
        let z = rng.random::<f64>() * box_size[2];
        (ParticleId(id), [x, y, z])
    })
}

/// This rank's share of [`uniform_positions`], with `depth` zeroed
/// history slots.
pub fn seed_owned<R: Real>(
    count: u64,
    box_size: [f64; 3],
    seed: u64,
    redistributor: &Redistributor,
    depth: usize,
) -> Result<ParticleState<R>, StepError> {
    let mut ids = Vec::new();
    let mut positions = Vec::new();
    for (id, p) in uniform_positions(count, box_size, seed) {
        let stored = [R::cast(p[0]), R::cast(p[1]), R::cast(p[2])];
        if redistributor.owns_position(stored[2]) {
            ids.push(id);
            positions.push(stored);
        }
    }
    ParticleState::with_positions(ids, positions, depth)
}
