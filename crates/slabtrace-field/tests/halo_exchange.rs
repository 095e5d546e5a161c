//! Multi-rank halo exchange and interpolation across slab boundaries.

use slabtrace_comm::Transport;
use slabtrace_core::Rank;
use slabtrace_field::{GridPoint, GridShape, HaloInterpolator, LagrangeBasis, SlabLayout};
use slabtrace_test_utils::fixtures::{constant, linear_in_z, sinusoid};
use slabtrace_test_utils::run_ranks;

fn point(index: [i64; 3], offset: [f64; 3]) -> GridPoint {
    GridPoint { index, offset }
}

#[test]
fn halos_hold_neighbour_planes() {
    let layout = SlabLayout::even(GridShape::new(2, 2, 8), 1, 2).unwrap();
    let halos = run_ranks(2, |mut t| {
        let me = t.rank();
        let sample = linear_in_z::<f64>(&layout, me);
        let basis = LagrangeBasis::new(1).unwrap();
        let interp = HaloInterpolator::new(layout.clone(), basis, &sample, &mut t).unwrap();
        let t1 = interp.buffers().t1();
        (t1.lower_halo().to_vec(), t1.upper_halo().to_vec())
    });
    // Rank 0 owns planes 0..4: below it are 6, 7 (wrapped), above it 4, 5.
    assert_eq!(halos[0].0, vec![6.0, 6.0, 6.0, 6.0, 7.0, 7.0, 7.0, 7.0]);
    assert_eq!(halos[0].1, vec![4.0, 4.0, 4.0, 4.0, 5.0, 5.0, 5.0, 5.0]);
    assert_eq!(halos[1].0, vec![2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0]);
    assert_eq!(halos[1].1, vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
}

#[test]
fn linear_field_interpolates_across_rank_boundary() {
    let layout = SlabLayout::even(GridShape::new(2, 2, 8), 1, 2).unwrap();
    let values = run_ranks(2, |mut t| {
        let me = t.rank();
        let sample = linear_in_z::<f64>(&layout, me);
        let basis = LagrangeBasis::new(1).unwrap();
        let interp = HaloInterpolator::new(layout.clone(), basis, &sample, &mut t).unwrap();
        let mut out = [0.0];
        // z = 3.5 is the last cell of rank 0 and one below rank 1's slab.
        interp
            .evaluate(1.0, &point([1, 0, 3], [0.3, 0.7, 0.5]), [0, 0, 0], &mut out)
            .unwrap();
        out[0]
    });
    for v in values {
        assert!((v - 3.5).abs() < 1e-12, "got {v}");
    }
}

#[test]
fn derivative_of_linear_field_is_one() {
    let layout = SlabLayout::even(GridShape::new(3, 3, 12), 1, 2).unwrap();
    let slopes = run_ranks(2, |mut t| {
        let me = t.rank();
        let sample = linear_in_z::<f64>(&layout, me);
        let basis = LagrangeBasis::new(2).unwrap();
        let interp = HaloInterpolator::new(layout.clone(), basis, &sample, &mut t).unwrap();
        let z = if me == Rank(0) { 4 } else { 6 };
        let mut dz = [0.0];
        interp
            .evaluate(1.0, &point([0, 2, z], [0.1, 0.2, 0.3]), [0, 0, 1], &mut dz)
            .unwrap();
        let mut dx = [0.0];
        interp
            .evaluate(1.0, &point([0, 2, z], [0.1, 0.2, 0.3]), [1, 0, 0], &mut dx)
            .unwrap();
        (dz[0], dx[0])
    });
    for (dz, dx) in slopes {
        assert!((dz - 1.0).abs() < 1e-10, "dz = {dz}");
        assert!(dx.abs() < 1e-10, "dx = {dx}");
    }
}

#[test]
fn decomposed_evaluation_matches_single_slab() {
    let shape = GridShape::new(4, 4, 16);
    let queries = [
        point([0, 1, 0], [0.25, 0.5, 0.4]),
        point([3, 2, 7], [0.9, 0.1, 0.6]),
        point([1, 3, 11], [0.0, 0.75, 0.95]),
        point([2, 0, 15], [0.5, 0.5, 0.5]),
    ];

    let whole = SlabLayout::even(shape, 3, 1).unwrap();
    let reference = run_ranks(1, |mut t| {
        let sample = sinusoid::<f32>(&whole, Rank(0));
        let interp =
            HaloInterpolator::new(whole.clone(), LagrangeBasis::new(1).unwrap(), &sample, &mut t)
                .unwrap();
        queries
            .iter()
            .map(|q| {
                let mut out = [0.0; 3];
                interp.evaluate(1.0, q, [0, 0, 0], &mut out).unwrap();
                out
            })
            .collect::<Vec<_>>()
    })
    .remove(0);

    let split = SlabLayout::even(shape, 3, 4).unwrap();
    let per_rank = run_ranks(4, |mut t| {
        let me = t.rank();
        let sample = sinusoid::<f32>(&split, me);
        let interp =
            HaloInterpolator::new(split.clone(), LagrangeBasis::new(1).unwrap(), &sample, &mut t)
                .unwrap();
        let mut out = [0.0; 3];
        interp.evaluate(1.0, &queries[me.0], [0, 0, 0], &mut out).unwrap();
        out
    });

    for (rank, got) in per_rank.iter().enumerate() {
        assert_eq!(got, &reference[rank], "rank {rank}");
    }
}

#[test]
fn refresh_rotates_generations_on_every_rank() {
    let layout = SlabLayout::even(GridShape::new(2, 2, 6), 3, 3).unwrap();
    let results = run_ranks(3, |mut t| {
        let me = t.rank();
        let basis = LagrangeBasis::new(1).unwrap();
        let first = constant::<f64>(&layout, me, &[1.0, 0.0, 0.0]);
        let mut interp = HaloInterpolator::new(layout.clone(), basis, &first, &mut t).unwrap();
        let second = constant::<f64>(&layout, me, &[3.0, 2.0, 0.0]);
        interp.refresh(&second, &mut t).unwrap();
        let third = constant::<f64>(&layout, me, &[5.0, 4.0, 1.0]);
        interp.refresh(&third, &mut t).unwrap();

        let slab = interp.slab();
        let q = point([1, 1, slab.start as i64], [0.5, 0.5, 0.5]);
        let mut out = [0.0; 3];
        interp.evaluate(0.5, &q, [0, 0, 0], &mut out).unwrap();
        out
    });
    for out in results {
        assert!((out[0] - 4.0).abs() < 1e-12);
        assert!((out[1] - 3.0).abs() < 1e-12);
        assert!((out[2] - 0.5).abs() < 1e-12);
    }
}
