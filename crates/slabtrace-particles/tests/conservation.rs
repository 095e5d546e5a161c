//! Conservation and ownership across many ranks and steps.

use slabtrace_comm::{all_reduce_sum, Transport};
use slabtrace_core::Rank;
use slabtrace_field::{GridShape, LagrangeBasis, SlabLayout};
use slabtrace_particles::{
    seed_owned, uniform_positions, ParticleSystem, PartitionClassifier, Redistributor,
    SlabParticleSystem, SystemConfig,
};
use slabtrace_test_utils::fixtures::{sample_with, sinusoid};
use slabtrace_test_utils::run_ranks;

const RANKS: usize = 4;
const COUNT: u64 = 500;

fn layout() -> SlabLayout {
    SlabLayout::even(GridShape::new(8, 8, 16), 3, RANKS).unwrap()
}

fn config() -> SystemConfig {
    SystemConfig {
        box_size: [1.0, 1.0, 1.0],
        integration_order: 4,
        dt: 0.05,
        ..SystemConfig::default()
    }
}

#[test]
fn seeding_partitions_the_global_set() {
    let layout = layout();
    let cfg = config();
    let ids = run_ranks(RANKS, |t| {
        let c = PartitionClassifier::new(0.0, 1.0, 16).unwrap();
        let red = Redistributor::new(c, &layout, t.rank()).unwrap();
        let s = seed_owned::<f32>(COUNT, cfg.box_size, 11, &red, 4).unwrap();
        s.ids().iter().map(|id| id.0).collect::<Vec<_>>()
    });
    let mut all: Vec<u64> = ids.into_iter().flatten().collect();
    all.sort_unstable();
    assert_eq!(all, (0..COUNT).collect::<Vec<_>>());
}

#[test]
fn count_and_ownership_hold_every_step() {
    let layout = layout();
    let cfg = config();
    let reports = run_ranks(RANKS, |t| {
        let me = t.rank();
        let c = PartitionClassifier::new(0.0, 1.0, 16).unwrap();
        let red = Redistributor::new(c, &layout, me).unwrap();
        let particles = seed_owned::<f64>(COUNT, cfg.box_size, 3, &red, 4).unwrap();
        // Strong z-drift so particles keep crossing slabs, some by more
        // than one partition per step.
        let field = sample_with::<f32, _>(&layout, me, |[x, y, _], comp| match comp {
            0 => (y as f64 * 0.7).sin(),
            1 => (x as f64 * 0.3).cos(),
            _ => 1.5 + (x as f64 * 0.5).sin(),
        });
        let probe = t.rank();
        let mut sys = SlabParticleSystem::new(
            cfg.clone(),
            layout.clone(),
            LagrangeBasis::new(2).unwrap(),
            &field,
            particles,
            t,
        )
        .unwrap();
        let mut counts = Vec::new();
        for _ in 0..12 {
            let report = sys.complete_loop().unwrap();
            let owned = sys.redistributor().owned_interval();
            let p = sys.particles().unwrap();
            assert!(
                p.positions().iter().all(|pos| owned.contains(&pos[2])),
                "rank {probe} holds a particle outside {owned:?}"
            );
            let table = sys.partition_table().unwrap();
            assert_eq!(table.total(), p.len());
            counts.push(report.local_count as u64);
        }
        (me, counts)
    });

    for step in 0..12 {
        let total: u64 = reports.iter().map(|(_, c)| c[step]).sum();
        assert_eq!(total, COUNT, "step {step}");
    }
    assert_eq!(reports[0].0, Rank(0));
}

#[test]
fn refreshed_field_changes_velocities() {
    let layout = layout();
    let cfg = SystemConfig {
        integration_order: 1,
        time_fraction: 0.5,
        ..config()
    };
    let totals = run_ranks(RANKS, |t| {
        let me = t.rank();
        let c = PartitionClassifier::new(0.0, 1.0, 16).unwrap();
        let red = Redistributor::new(c, &layout, me).unwrap();
        let particles = seed_owned::<f64>(64, cfg.box_size, 5, &red, 1).unwrap();
        let first = sinusoid::<f64>(&layout, me);
        let mut sys = SlabParticleSystem::new(
            cfg.clone(),
            layout.clone(),
            LagrangeBasis::new(1).unwrap(),
            &first,
            particles,
            t,
        )
        .unwrap();
        let still = vec![0.0f64; first.len()];
        sys.refresh_field(&still).unwrap();
        sys.compute_rhs().unwrap();
        let p = sys.particles().unwrap();
        let mut max_err = 0.0f64;
        for (pos, v) in p.positions().iter().zip(p.history().slot(0)) {
            // Blend halfway between the sinusoid and a zero field.
            let want = 0.5 * (2.0 * std::f64::consts::PI * pos[0]).sin();
            max_err = max_err.max((v[0] - want).abs());
        }
        max_err
    });
    for err in totals {
        assert!(err < 0.05, "max error {err}");
    }
}

#[test]
fn global_set_is_independent_of_rank_count() {
    let a: Vec<_> = uniform_positions(32, [1.0; 3], 9).collect();
    let sums = run_ranks(2, |mut t| {
        let layout = SlabLayout::even(GridShape::new(4, 4, 8), 3, 2).unwrap();
        let c = PartitionClassifier::new(0.0, 1.0, 8).unwrap();
        let red = Redistributor::new(c, &layout, t.rank()).unwrap();
        let s = seed_owned::<f64>(32, [1.0; 3], 9, &red, 1).unwrap();
        all_reduce_sum(&mut t, s.len() as u64).unwrap()
    });
    assert_eq!(sums, vec![a.len() as u64; 2]);
}
