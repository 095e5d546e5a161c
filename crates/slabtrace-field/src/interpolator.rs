//! Halo-buffered stencil interpolation over a slab-decomposed field.

use smallvec::SmallVec;
use tracing::{debug, instrument};

use slabtrace_comm::{Envelope, PacketReader, PacketWriter, Phase, Transport};
use slabtrace_core::{FieldError, Rank, Real};

use crate::basis::{BasisWeights, MAX_HALF_WIDTH};
use crate::halo::{HaloBuffer, HaloPair};
use crate::layout::{LocalSlab, SlabLayout};

const MAX_STENCIL: usize = 2 * MAX_HALF_WIDTH + 2;

type Weights = SmallVec<[f64; MAX_STENCIL]>;

/// A query location: the containing cell and the fractional offset in it.
///
/// Both arrays are in `[x, y, z]` order. `index` is a global cell index
/// (x and y may lie outside the grid; they wrap) and every `offset`
/// component lies in `[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPoint {
    /// Global cell index per axis.
    pub index: [i64; 3],
    /// Fractional position inside the cell per axis.
    pub offset: [f64; 3],
}

impl GridPoint {
    /// Locate a physical position on a grid with the given cell spacing.
    pub fn locate(position: [f64; 3], spacing: [f64; 3]) -> Self {
        let mut index = [0i64; 3];
        let mut offset = [0.0f64; 3];
        for axis in 0..3 {
            let scaled = position[axis] / spacing[axis];
            let cell = scaled.floor();
            index[axis] = cell as i64;
            offset[axis] = scaled - cell;
        }
        Self { index, offset }
    }
}

/// Two-generation, halo-padded copy of one rank's slab with stencil
/// evaluation.
///
/// The halo width is `N + 1` for a basis of half-width `N`: a stencil
/// spans nodes `-N..=N+1` around the query cell, and the query cell may
/// itself sit one plane below the slab.
///
/// Field samples are stored as `T`; evaluation accumulates in `f64`.
pub struct HaloInterpolator<T, B> {
    layout: SlabLayout,
    slab: LocalSlab,
    basis: B,
    halo: usize,
    buffers: HaloPair<T>,
}

impl<T: Real, B: BasisWeights> HaloInterpolator<T, B> {
    /// Build the interpolator for `transport.rank()` and exchange halos of
    /// `initial`, which fills both generations.
    ///
    /// Collective: every rank of the layout must call this together.
    #[instrument(skip_all, name = "interpolator_new", fields(rank = transport.rank().0))]
    pub fn new<C: Transport + ?Sized>(
        layout: SlabLayout,
        basis: B,
        initial: &[T],
        transport: &mut C,
    ) -> Result<Self, FieldError> {
        if transport.size() != layout.ranks() {
            return Err(FieldError::InvalidLayout {
                reason: format!(
                    "layout has {} ranks, transport has {}",
                    layout.ranks(),
                    transport.size()
                ),
            });
        }
        let [px, py] = layout.periodic();
        if !px {
            return Err(FieldError::NonPeriodicAxis { axis: "x" });
        }
        if !py {
            return Err(FieldError::NonPeriodicAxis { axis: "y" });
        }
        let half_width = basis.half_width();
        if half_width == 0 || half_width > MAX_HALF_WIDTH {
            return Err(FieldError::UnsupportedHalfWidth {
                half_width,
                max: MAX_HALF_WIDTH,
            });
        }
        let halo = half_width + 1;
        if let Some(thin) = layout.slabs().find(|s| s.planes < halo) {
            return Err(FieldError::SlabTooThin {
                rank: thin.rank,
                planes: thin.planes,
                halo,
            });
        }

        let slab = layout.local(transport.rank())?;
        let expected = slab.planes * layout.plane_len();
        if initial.len() != expected {
            return Err(FieldError::SampleSizeMismatch {
                expected,
                found: initial.len(),
            });
        }

        let mut first = HaloBuffer::new(slab.planes, halo, layout.plane_len());
        first.interior_mut().copy_from_slice(initial);
        fill_halos(&layout, &slab, &mut first, transport)?;
        debug!(
            start = slab.start,
            planes = slab.planes,
            halo,
            "interpolator ready"
        );

        Ok(Self {
            layout,
            slab,
            basis,
            halo,
            buffers: HaloPair::from_initial(first),
        })
    }

    /// Replace the older generation with `sample` and exchange its halos.
    ///
    /// Collective. After this, `t0` is the previous `t1` and `t1` is
    /// `sample`.
    #[instrument(skip_all, name = "halo_refresh", fields(rank = self.slab.rank.0))]
    pub fn refresh<C: Transport + ?Sized>(
        &mut self,
        sample: &[T],
        transport: &mut C,
    ) -> Result<(), FieldError> {
        let expected = self.slab.planes * self.layout.plane_len();
        if sample.len() != expected {
            return Err(FieldError::SampleSizeMismatch {
                expected,
                found: sample.len(),
            });
        }
        let fresh = self.buffers.rotate();
        fresh.interior_mut().copy_from_slice(sample);
        fill_halos(&self.layout, &self.slab, fresh, transport)
    }

    /// Evaluate the field, or a derivative of it, at `point`.
    ///
    /// `time_fraction` blends the generations as
    /// `(1 - t) * t0 + t * t1`; `derivative` gives the order per axis in
    /// `[x, y, z]` order. `out` receives one value per component.
    ///
    /// Local only. Fails if the z stencil would leave the halo-padded
    /// buffer, i.e. unless `-1 <= z - start <= planes - 1`.
    pub fn evaluate(
        &self,
        time_fraction: f64,
        point: &GridPoint,
        derivative: [u8; 3],
        out: &mut [f64],
    ) -> Result<(), FieldError> {
        if !(0.0..=1.0).contains(&time_fraction) {
            return Err(FieldError::InvalidTimeFraction {
                value: time_fraction,
            });
        }
        let components = self.layout.components();
        if out.len() != components {
            return Err(FieldError::ComponentMismatch {
                expected: components,
                found: out.len(),
            });
        }
        let max = self.basis.max_derivative();
        if let Some(&order) = derivative.iter().find(|&&d| d > max) {
            return Err(FieldError::UnsupportedDerivative { order, max });
        }
        let planes = self.slab.planes as i64;
        let local_z = point.index[2] - self.slab.start as i64;
        if !(-1..planes).contains(&local_z) {
            return Err(FieldError::OutsideHalo {
                local_plane: local_z,
                planes: self.slab.planes,
            });
        }

        let len = self.basis.stencil_len();
        let mut w: [Weights; 3] = Default::default();
        for axis in 0..3 {
            w[axis].resize(len, 0.0);
            self.basis
                .weights(derivative[axis], point.offset[axis], &mut w[axis]);
        }

        let n = self.basis.half_width() as i64;
        let shape = self.layout.shape();
        let (nx, ny) = (shape.nx as i64, shape.ny as i64);
        // Reduced first so the stencil offsets cannot overflow.
        let (ix, iy) = (point.index[0].rem_euclid(nx), point.index[1].rem_euclid(ny));
        let blend_old = 1.0 - time_fraction;
        let (t0, t1) = self.buffers.generations();
        out.fill(0.0);

        for (kz, &bz) in w[2].iter().enumerate() {
            let padded = (local_z - n + kz as i64 + self.halo as i64) as usize;
            let old_plane = t0.padded_plane(padded);
            let new_plane = t1.padded_plane(padded);
            for (ky, &by) in w[1].iter().enumerate() {
                let gy = (iy - n + ky as i64).rem_euclid(ny) as usize;
                let bzy = bz * by;
                for (kx, &bx) in w[0].iter().enumerate() {
                    let gx = (ix - n + kx as i64).rem_euclid(nx) as usize;
                    let weight = bzy * bx;
                    let base = (gy * shape.nx + gx) * components;
                    for (c, acc) in out.iter_mut().enumerate() {
                        let a = old_plane[base + c].widen();
                        let b = new_plane[base + c].widen();
                        *acc += weight * (blend_old * a + time_fraction * b);
                    }
                }
            }
        }
        Ok(())
    }

    /// The layout this interpolator was built from.
    pub fn layout(&self) -> &SlabLayout {
        &self.layout
    }

    /// This rank's slab.
    pub fn slab(&self) -> LocalSlab {
        self.slab
    }

    /// The weight source.
    pub fn basis(&self) -> &B {
        &self.basis
    }

    /// Halo width in planes (`N + 1`).
    pub fn halo_width(&self) -> usize {
        self.halo
    }

    /// Both halo-padded generations.
    pub fn buffers(&self) -> &HaloPair<T> {
        &self.buffers
    }
}

impl<T, B> std::fmt::Debug for HaloInterpolator<T, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaloInterpolator")
            .field("slab", &self.slab)
            .field("halo", &self.halo)
            .field("components", &self.layout.components())
            .finish()
    }
}

/// Send the top planes up and the bottom planes down, then fill the lower
/// halo from the rank below and the upper halo from the rank above.
fn fill_halos<T: Real, C: Transport + ?Sized>(
    layout: &SlabLayout,
    slab: &LocalSlab,
    buffer: &mut HaloBuffer<T>,
    transport: &mut C,
) -> Result<(), FieldError> {
    let me = slab.rank;
    let above = layout.owner_of_plane(slab.end() as i64);
    let below = layout.owner_of_plane(slab.start as i64 - 1);
    let bytes = buffer.halo_len() * T::DTYPE.bytes();

    let mut up = PacketWriter::with_capacity(bytes);
    up.put_reals(buffer.top_planes());
    transport.send(Envelope::new(Phase::HaloUpward, me, above), up.finish())?;

    let mut down = PacketWriter::with_capacity(bytes);
    down.put_reals(buffer.bottom_planes());
    transport.send(Envelope::new(Phase::HaloDownward, me, below), down.finish())?;

    let from_below = transport.recv(Envelope::new(Phase::HaloUpward, below, me))?;
    unpack_halo(&from_below, below, buffer.lower_halo_mut())?;
    let from_above = transport.recv(Envelope::new(Phase::HaloDownward, above, me))?;
    unpack_halo(&from_above, above, buffer.upper_halo_mut())
}

fn unpack_halo<T: Real>(packet: &[u8], from: Rank, dst: &mut [T]) -> Result<(), FieldError> {
    let width = T::DTYPE.bytes();
    if packet.len() != dst.len() * width {
        return Err(FieldError::HaloSizeMismatch {
            from,
            expected: dst.len(),
            found: packet.len() / width,
        });
    }
    let mut reader = PacketReader::new(packet);
    reader.get_reals_exact(dst)?;
    reader.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::LagrangeBasis;
    use crate::layout::GridShape;
    use slabtrace_comm::LocalCluster;

    fn single_rank(
        shape: GridShape,
        components: usize,
        half_width: usize,
        sample: &[f64],
    ) -> (HaloInterpolator<f64, LagrangeBasis>, slabtrace_comm::ChannelTransport) {
        let mut t = LocalCluster::endpoints(1).remove(0);
        let layout = SlabLayout::even(shape, components, 1).unwrap();
        let basis = LagrangeBasis::new(half_width).unwrap();
        let interp = HaloInterpolator::new(layout, basis, sample, &mut t).unwrap();
        (interp, t)
    }

    fn ramp(shape: GridShape) -> Vec<f64> {
        (0..shape.cells()).map(|i| i as f64).collect()
    }

    #[test]
    fn single_rank_halos_wrap() {
        let shape = GridShape::new(1, 1, 4);
        let (interp, _t) = single_rank(shape, 1, 1, &[0.0, 1.0, 2.0, 3.0]);
        let t1 = interp.buffers().t1();
        assert_eq!(t1.lower_halo(), &[2.0, 3.0]);
        assert_eq!(t1.upper_halo(), &[0.0, 1.0]);
    }

    #[test]
    fn exact_at_grid_points() {
        let shape = GridShape::new(4, 5, 6);
        let sample = ramp(shape);
        let (interp, _t) = single_rank(shape, 1, 2, &sample);
        let mut out = [0.0];
        for z in 0..6 {
            for y in 0..5 {
                for x in 0..4 {
                    let p = GridPoint {
                        index: [x, y, z],
                        offset: [0.0; 3],
                    };
                    interp.evaluate(1.0, &p, [0, 0, 0], &mut out).unwrap();
                    let want = sample[((z * 5 + y) * 4 + x) as usize];
                    assert_eq!(out[0], want);
                }
            }
        }
    }

    #[test]
    fn time_blend_mixes_generations() {
        let shape = GridShape::new(2, 2, 2);
        let (mut interp, mut t) = single_rank(shape, 1, 1, &[1.0; 8]);
        interp.refresh(&[3.0; 8], &mut t).unwrap();
        let p = GridPoint {
            index: [0, 1, 1],
            offset: [0.25, 0.5, 0.75],
        };
        let mut out = [0.0];
        interp.evaluate(0.5, &p, [0, 0, 0], &mut out).unwrap();
        assert!((out[0] - 2.0).abs() < 1e-12);
        interp.evaluate(0.0, &p, [0, 0, 0], &mut out).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn x_wraps_periodically() {
        let shape = GridShape::new(4, 1, 2);
        let plane = [5.0, 6.0, 7.0, 8.0];
        let sample: Vec<f64> = plane.iter().chain(plane.iter()).copied().collect();
        let (interp, _t) = single_rank(shape, 1, 1, &sample);
        let mut out = [0.0];
        for (ix, want) in [(-1, 8.0), (4, 5.0), (9, 6.0)] {
            let p = GridPoint {
                index: [ix, 0, 0],
                offset: [0.0; 3],
            };
            interp.evaluate(1.0, &p, [0, 0, 0], &mut out).unwrap();
            assert_eq!(out[0], want);
        }
    }

    #[test]
    fn extreme_xy_indices_wrap() {
        let shape = GridShape::new(4, 3, 4);
        let sample = ramp(shape);
        let (interp, _t) = single_rank(shape, 1, 2, &sample);
        let mut out = [0.0];
        let mut want = [0.0];
        for (ix, iy) in [(i64::MAX, i64::MIN), (i64::MIN, i64::MAX)] {
            let far = GridPoint {
                index: [ix, iy, 1],
                offset: [0.5, 0.25, 0.0],
            };
            let near = GridPoint {
                index: [ix.rem_euclid(4), iy.rem_euclid(3), 1],
                ..far
            };
            interp.evaluate(1.0, &far, [0, 0, 0], &mut out).unwrap();
            interp.evaluate(1.0, &near, [0, 0, 0], &mut want).unwrap();
            assert_eq!(out, want);
        }
    }

    #[test]
    fn queries_outside_halo_are_rejected() {
        let shape = GridShape::new(2, 2, 4);
        let (interp, _t) = single_rank(shape, 1, 1, &[0.0; 16]);
        let mut out = [0.0];
        for z in [-2, 4] {
            let p = GridPoint {
                index: [0, 0, z],
                offset: [0.0; 3],
            };
            assert!(matches!(
                interp.evaluate(1.0, &p, [0, 0, 0], &mut out),
                Err(FieldError::OutsideHalo { .. })
            ));
        }
        let edge = GridPoint {
            index: [0, 0, -1],
            offset: [0.0; 3],
        };
        assert!(interp.evaluate(1.0, &edge, [0, 0, 0], &mut out).is_ok());
    }

    #[test]
    fn argument_errors() {
        let shape = GridShape::new(2, 2, 4);
        let (interp, _t) = single_rank(shape, 2, 1, &[0.0; 32]);
        let p = GridPoint {
            index: [0, 0, 0],
            offset: [0.0; 3],
        };
        let mut out = [0.0; 2];
        assert!(matches!(
            interp.evaluate(1.5, &p, [0, 0, 0], &mut out),
            Err(FieldError::InvalidTimeFraction { .. })
        ));
        assert!(matches!(
            interp.evaluate(f64::NAN, &p, [0, 0, 0], &mut out),
            Err(FieldError::InvalidTimeFraction { .. })
        ));
        assert!(matches!(
            interp.evaluate(1.0, &p, [0, 0, 2], &mut out),
            Err(FieldError::UnsupportedDerivative { order: 2, max: 1 })
        ));
        assert!(matches!(
            interp.evaluate(1.0, &p, [0, 0, 0], &mut [0.0; 3]),
            Err(FieldError::ComponentMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn construction_preconditions() {
        let shape = GridShape::new(2, 2, 4);
        let basis = LagrangeBasis::new(1).unwrap();
        let mut t = LocalCluster::endpoints(1).remove(0);

        let open_y = SlabLayout::even(shape, 1, 1).unwrap().with_periodic(true, false);
        assert_eq!(
            HaloInterpolator::<f64, _>::new(open_y, basis.clone(), &[0.0; 16], &mut t).err(),
            Some(FieldError::NonPeriodicAxis { axis: "y" })
        );

        let thin = SlabLayout::even(GridShape::new(2, 2, 1), 1, 1).unwrap();
        assert!(matches!(
            HaloInterpolator::<f64, _>::new(thin, basis.clone(), &[0.0; 4], &mut t),
            Err(FieldError::SlabTooThin { planes: 1, halo: 2, .. })
        ));

        let layout = SlabLayout::even(shape, 1, 1).unwrap();
        assert!(matches!(
            HaloInterpolator::<f64, _>::new(layout.clone(), basis.clone(), &[0.0; 15], &mut t),
            Err(FieldError::SampleSizeMismatch { expected: 16, found: 15 })
        ));

        let mut interp = HaloInterpolator::<f64, _>::new(layout, basis, &[0.0; 16], &mut t).unwrap();
        assert!(matches!(
            interp.refresh(&[0.0; 8], &mut t),
            Err(FieldError::SampleSizeMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_halo_packet_is_rejected() {
        let mut dst = [0.0f64; 4];
        let mut w = PacketWriter::new();
        w.put_reals(&[1.0f64, 2.0, 3.0]);
        assert_eq!(
            unpack_halo(&w.finish(), Rank(1), &mut dst),
            Err(FieldError::HaloSizeMismatch {
                from: Rank(1),
                expected: 4,
                found: 3
            })
        );
    }

    #[test]
    fn locate_splits_cell_and_offset() {
        let p = GridPoint::locate([0.75, -0.25, 4.9], [0.5, 0.5, 1.0]);
        assert_eq!(p.index, [1, -1, 4]);
        assert!((p.offset[0] - 0.5).abs() < 1e-12);
        assert!((p.offset[1] - 0.5).abs() < 1e-12);
        assert!((p.offset[2] - 0.9).abs() < 1e-12);
    }
}
