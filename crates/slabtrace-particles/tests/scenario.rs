//! Two ranks split [0, 10) at 5; a particle at z = 4.9 moving at 3 per
//! unit time crosses into rank 1 after one Euler step.

use slabtrace_comm::Transport;
use slabtrace_core::{ParticleId, Rank};
use slabtrace_field::{GridShape, LagrangeBasis, SlabLayout};
use slabtrace_particles::{ParticleState, ParticleSystem, SlabParticleSystem, SystemConfig};
use slabtrace_test_utils::fixtures::constant;
use slabtrace_test_utils::run_ranks;

#[test]
fn particle_crosses_slab_boundary() {
    let layout = SlabLayout::from_plane_counts(GridShape::new(4, 4, 10), 3, &[5, 5]).unwrap();
    let outcome = run_ranks(2, |t| {
        let me = t.rank();
        let field = constant::<f64>(&layout, me, &[0.0, 0.0, 3.0]);
        let config = SystemConfig {
            box_size: [4.0, 4.0, 10.0],
            integration_order: 1,
            dt: 1.0,
            ..SystemConfig::default()
        };
        let particles = if me == Rank(0) {
            ParticleState::<f64>::with_positions(vec![ParticleId(42)], vec![[1.0, 2.0, 4.9]], 1)
                .unwrap()
        } else {
            ParticleState::empty(1)
        };
        let mut sys = SlabParticleSystem::new(
            config,
            layout.clone(),
            LagrangeBasis::new(1).unwrap(),
            &field,
            particles,
            t,
        )
        .unwrap();
        assert_eq!(sys.local_count(), usize::from(me == Rank(0)));

        let report = sys.complete_loop().unwrap();
        let p = sys.particles().unwrap();
        let held: Vec<(ParticleId, f64)> = p
            .ids()
            .iter()
            .zip(p.positions())
            .map(|(&id, pos)| (id, pos[2]))
            .collect();
        (held, report.sent, report.received)
    });

    let (rank0, sent0, received0) = &outcome[0];
    let (rank1, sent1, received1) = &outcome[1];
    assert!(rank0.is_empty(), "rank 0 still holds {rank0:?}");
    assert_eq!((*sent0, *received0), (1, 0));
    assert_eq!((*sent1, *received1), (0, 1));
    assert_eq!(rank1.len(), 1);
    assert_eq!(rank1[0].0, ParticleId(42));
    assert!((rank1[0].1 - 7.9).abs() < 1e-12, "z = {}", rank1[0].1);
}

#[test]
fn history_travels_with_particle() {
    let layout = SlabLayout::from_plane_counts(GridShape::new(4, 4, 10), 3, &[5, 5]).unwrap();
    let histories = run_ranks(2, |t| {
        let me = t.rank();
        let field = constant::<f64>(&layout, me, &[0.0, 0.0, 1.0]);
        let config = SystemConfig {
            box_size: [4.0, 4.0, 10.0],
            integration_order: 3,
            dt: 0.5,
            ..SystemConfig::default()
        };
        let particles = if me == Rank(0) {
            ParticleState::<f64>::with_positions(vec![ParticleId(1)], vec![[0.0, 0.0, 3.9]], 3)
                .unwrap()
        } else {
            ParticleState::empty(3)
        };
        let mut sys = SlabParticleSystem::new(
            config,
            layout.clone(),
            LagrangeBasis::new(1).unwrap(),
            &field,
            particles,
            t,
        )
        .unwrap();
        // 3.9 -> 4.4 -> 4.9 -> 5.4: the third step crosses into rank 1.
        for _ in 0..3 {
            sys.complete_loop().unwrap();
        }
        let p = sys.particles().unwrap();
        (0..p.history().depth())
            .map(|s| p.history().slot(s).to_vec())
            .collect::<Vec<_>>()
    });
    assert!(histories[0].iter().all(|slot| slot.is_empty()));
    let moved = &histories[1];
    assert_eq!(moved[0], vec![[0.0; 3]]);
    for slot in &moved[1..] {
        assert!((slot[0][2] - 1.0).abs() < 1e-12);
    }
}
