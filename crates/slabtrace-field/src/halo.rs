//! Halo-padded slab buffers and the two-generation pair.
//!
//! A [`HaloBuffer`] stores `halo + planes + halo` z planes contiguously:
//!
//! ```text
//! padded plane:  0 .. halo        lower halo  (copied from the rank below)
//!                halo .. halo+p   interior    (this rank's slab)
//!                halo+p .. +halo  upper halo  (copied from the rank above)
//! ```
//!
//! All access goes through named sub-views whose ranges are asserted at
//! construction, so no caller computes raw offsets into the storage.

use slabtrace_core::Real;

/// One time generation of a slab plus its halo planes.
#[derive(Clone, Debug, PartialEq)]
pub struct HaloBuffer<T> {
    data: Vec<T>,
    planes: usize,
    halo: usize,
    plane_len: usize,
}

impl<T: Real> HaloBuffer<T> {
    /// Zero-filled buffer for `planes` interior planes of `plane_len` values.
    ///
    /// # Panics
    ///
    /// If `halo > planes`: the top and bottom sub-views sent to neighbours
    /// would overlap the opposite halo.
    pub fn new(planes: usize, halo: usize, plane_len: usize) -> Self {
        assert!(
            halo <= planes,
            "halo width {halo} exceeds slab of {planes} planes"
        );
        Self {
            data: vec![T::zero(); (planes + 2 * halo) * plane_len],
            planes,
            halo,
            plane_len,
        }
    }
}

impl<T> HaloBuffer<T> {
    /// Interior planes.
    pub fn planes(&self) -> usize {
        self.planes
    }

    /// Halo width in planes.
    pub fn halo(&self) -> usize {
        self.halo
    }

    /// Values per plane.
    pub fn plane_len(&self) -> usize {
        self.plane_len
    }

    /// Values in one halo (`halo * plane_len`).
    pub fn halo_len(&self) -> usize {
        self.halo * self.plane_len
    }

    /// Planes including both halos.
    pub fn padded_planes(&self) -> usize {
        self.planes + 2 * self.halo
    }

    /// The slab without halos.
    pub fn interior(&self) -> &[T] {
        let pl = self.plane_len;
        &self.data[self.halo * pl..(self.halo + self.planes) * pl]
    }

    /// Mutable slab without halos.
    pub fn interior_mut(&mut self) -> &mut [T] {
        let pl = self.plane_len;
        &mut self.data[self.halo * pl..(self.halo + self.planes) * pl]
    }

    /// The `halo` lowest interior planes, sent to the rank below.
    pub fn bottom_planes(&self) -> &[T] {
        let pl = self.plane_len;
        &self.data[self.halo * pl..2 * self.halo * pl]
    }

    /// The `halo` highest interior planes, sent to the rank above.
    pub fn top_planes(&self) -> &[T] {
        let pl = self.plane_len;
        &self.data[self.planes * pl..(self.planes + self.halo) * pl]
    }

    /// Lower halo.
    pub fn lower_halo(&self) -> &[T] {
        &self.data[..self.halo * self.plane_len]
    }

    /// Upper halo.
    pub fn upper_halo(&self) -> &[T] {
        let pl = self.plane_len;
        &self.data[(self.halo + self.planes) * pl..]
    }

    /// Mutable lower halo.
    pub fn lower_halo_mut(&mut self) -> &mut [T] {
        let end = self.halo * self.plane_len;
        &mut self.data[..end]
    }

    /// Mutable upper halo.
    pub fn upper_halo_mut(&mut self) -> &mut [T] {
        let start = (self.halo + self.planes) * self.plane_len;
        &mut self.data[start..]
    }

    /// One plane by padded index (`0..padded_planes()`).
    ///
    /// # Panics
    ///
    /// If `padded` is out of range.
    pub fn padded_plane(&self, padded: usize) -> &[T] {
        assert!(
            padded < self.padded_planes(),
            "padded plane {padded} outside 0..{}",
            self.padded_planes()
        );
        let pl = self.plane_len;
        &self.data[padded * pl..(padded + 1) * pl]
    }
}

/// Two owned generations with a selector for the newer one.
///
/// The older generation is `t0`, the newer `t1`. [`rotate`](HaloPair::rotate)
/// flips the selector and hands back the previous `t0` for overwriting,
/// so a refresh reuses its storage rather than allocating.
#[derive(Clone, Debug)]
pub struct HaloPair<T> {
    buffers: [HaloBuffer<T>; 2],
    newest: usize,
}

impl<T: Real> HaloPair<T> {
    /// Pair of zero-filled generations.
    pub fn new(planes: usize, halo: usize, plane_len: usize) -> Self {
        Self {
            buffers: [
                HaloBuffer::new(planes, halo, plane_len),
                HaloBuffer::new(planes, halo, plane_len),
            ],
            newest: 1,
        }
    }
}

impl<T: Clone> HaloPair<T> {
    /// Pair whose generations both start as `initial`.
    pub fn from_initial(initial: HaloBuffer<T>) -> Self {
        Self {
            buffers: [initial.clone(), initial],
            newest: 1,
        }
    }
}

impl<T> HaloPair<T> {
    /// Older generation.
    pub fn t0(&self) -> &HaloBuffer<T> {
        &self.buffers[1 - self.newest]
    }

    /// Newer generation.
    pub fn t1(&self) -> &HaloBuffer<T> {
        &self.buffers[self.newest]
    }

    /// Mutable newer generation.
    pub fn t1_mut(&mut self) -> &mut HaloBuffer<T> {
        &mut self.buffers[self.newest]
    }

    /// Make the older generation the newer one and return it for refilling.
    pub fn rotate(&mut self) -> &mut HaloBuffer<T> {
        self.newest = 1 - self.newest;
        &mut self.buffers[self.newest]
    }

    /// Both generations as `(t0, t1)`.
    pub fn generations(&self) -> (&HaloBuffer<T>, &HaloBuffer<T>) {
        (self.t0(), self.t1())
    }
}
