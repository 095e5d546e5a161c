//! Benchmark profiles for slabtrace.
//!
//! - [`reference_profile`]: 32³ grid, 10K particles, quartic stencil
//! - [`stress_profile`]: 64³ grid, 100K particles, same stencil
//! - [`build_system`]: one rank's particle system for a profile
//! - [`velocity_field`]: the analytic field every profile advects through

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::f64::consts::PI;

use slabtrace_comm::{ChannelTransport, Transport};
use slabtrace_core::{Rank, StepError};
use slabtrace_field::{GridShape, LagrangeBasis, SlabLayout};
use slabtrace_particles::{
    seed_owned, PartitionClassifier, Redistributor, SlabParticleSystem, SystemConfig,
};

/// Particle system type used by every profile: double-precision
/// particles in a single-precision field.
pub type BenchSystem = SlabParticleSystem<f64, f32, LagrangeBasis, ChannelTransport>;

/// Sizes for one benchmark run.
#[derive(Clone, Debug)]
pub struct Profile {
    /// Grid extents.
    pub grid: GridShape,
    /// Global particle count.
    pub particles: u64,
    /// Stencil half-width.
    pub half_width: usize,
    /// Run configuration.
    pub config: SystemConfig,
}

impl Profile {
    /// Field layout over `ranks` slabs.
    pub fn layout(&self, ranks: usize) -> Result<SlabLayout, StepError> {
        Ok(SlabLayout::even(self.grid, 3, ranks)?)
    }
}

/// 32³ grid with 10K particles.
pub fn reference_profile() -> Profile {
    Profile {
        grid: GridShape::new(32, 32, 32),
        particles: 10_000,
        half_width: 2,
        config: SystemConfig {
            dt: 0.005,
            ..SystemConfig::default()
        },
    }
}

/// 64³ grid with 100K particles.
pub fn stress_profile() -> Profile {
    Profile {
        grid: GridShape::new(64, 64, 64),
        particles: 100_000,
        ..reference_profile()
    }
}

/// Taylor-Green-like periodic velocity on `rank`'s slab, `[z][y][x][c]`.
pub fn velocity_field(layout: &SlabLayout, rank: Rank) -> Result<Vec<f32>, StepError> {
    let slab = layout.local(rank)?;
    let shape = layout.shape();
    let n = shape.as_array().map(|v| v as f64);
    let mut out = Vec::with_capacity(layout.local_len(rank)?);
    for z in slab.start..slab.end() {
        let kz = 2.0 * PI * z as f64 / n[2];
        for y in 0..shape.ny {
            let ky = 2.0 * PI * y as f64 / n[1];
            for x in 0..shape.nx {
                let kx = 2.0 * PI * x as f64 / n[0];
                out.push((kx.sin() * ky.cos() * kz.cos()) as f32);
                out.push((-kx.cos() * ky.sin() * kz.cos()) as f32);
                out.push((0.5 + 0.25 * kx.sin()) as f32);
            }
        }
    }
    Ok(out)
}

/// Build the particle system for `transport.rank()` under `profile`,
/// seeding particles from `seed`. Collective.
pub fn build_system(
    profile: &Profile,
    transport: ChannelTransport,
    seed: u64,
) -> Result<BenchSystem, StepError> {
    let me = transport.rank();
    let layout = profile.layout(transport.size())?;
    let classifier =
        PartitionClassifier::new(0.0, profile.config.box_size[2], profile.grid.nz)?;
    let router = Redistributor::new(classifier, &layout, me)?;
    let particles = seed_owned::<f64>(
        profile.particles,
        profile.config.box_size,
        seed,
        &router,
        profile.config.integration_order,
    )?;
    let field = velocity_field(&layout, me)?;
    SlabParticleSystem::new(
        profile.config.clone(),
        layout,
        LagrangeBasis::new(profile.half_width)?,
        &field,
        particles,
        transport,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use slabtrace_comm::LocalCluster;
    use slabtrace_particles::ParticleSystem;

    #[test]
    fn profiles_validate() {
        reference_profile().config.validate().unwrap();
        stress_profile().config.validate().unwrap();
        assert_eq!(stress_profile().half_width, reference_profile().half_width);
    }

    #[test]
    fn velocity_field_fills_the_slab() {
        let layout = SlabLayout::even(GridShape::new(4, 4, 8), 3, 2).unwrap();
        let v = velocity_field(&layout, Rank(1)).unwrap();
        assert_eq!(v.len(), layout.local_len(Rank(1)).unwrap());
        assert!(v.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn small_system_steps() {
        let profile = Profile {
            grid: GridShape::new(8, 8, 8),
            particles: 50,
            ..reference_profile()
        };
        let t = LocalCluster::endpoints(1).remove(0);
        let mut sys = build_system(&profile, t, 1).unwrap();
        assert_eq!(sys.local_count(), 50);
        sys.complete_loop().unwrap();
        assert_eq!(sys.local_count(), 50);
    }
}
