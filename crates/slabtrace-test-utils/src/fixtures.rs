//! Analytic field samples for one rank's slab.
//!
//! Every fixture fills a rank's slab in `[z][y][x][component]` order
//! using global cell indices, so slabs built on different ranks agree
//! with a single global snapshot.

use slabtrace_core::{Rank, Real};
use slabtrace_field::SlabLayout;

/// Sample `f(global [x, y, z], component)` over the slab of `rank`.
///
/// # Panics
///
/// If `rank` is not part of `layout`.
pub fn sample_with<T, F>(layout: &SlabLayout, rank: Rank, f: F) -> Vec<T>
where
    T: Real,
    F: Fn([usize; 3], usize) -> f64,
{
    let slab = layout.local(rank).expect("rank in layout");
    let shape = layout.shape();
    let comps = layout.components();
    let mut out = Vec::with_capacity(slab.planes * layout.plane_len());
    for z in slab.start..slab.end() {
        for y in 0..shape.ny {
            for x in 0..shape.nx {
                for c in 0..comps {
                    out.push(T::cast(f([x, y, z], c)));
                }
            }
        }
    }
    out
}

/// The whole grid as one snapshot, in the same order.
pub fn global_with<T, F>(layout: &SlabLayout, f: F) -> Vec<T>
where
    T: Real,
    F: Fn([usize; 3], usize) -> f64,
{
    layout
        .slabs()
        .flat_map(|s| sample_with::<T, _>(layout, s.rank, &f))
        .collect()
}

/// The same value vector in every cell (`value[c]` for component `c`).
pub fn constant<T: Real>(layout: &SlabLayout, rank: Rank, value: &[f64]) -> Vec<T> {
    sample_with(layout, rank, |_, c| value[c])
}

/// Every component equals the global z index of the cell.
pub fn linear_in_z<T: Real>(layout: &SlabLayout, rank: Rank) -> Vec<T> {
    sample_with(layout, rank, |[_, _, z], _| z as f64)
}

/// Component `c` is `sin(2π i / n)` along axis `c % 3`: periodic on every
/// axis, so it is smooth across the wrap.
pub fn sinusoid<T: Real>(layout: &SlabLayout, rank: Rank) -> Vec<T> {
    let n = layout.shape().as_array();
    sample_with(layout, rank, |idx, c| {
        let axis = c % 3;
        (2.0 * std::f64::consts::PI * idx[axis] as f64 / n[axis] as f64).sin()
    })
}
