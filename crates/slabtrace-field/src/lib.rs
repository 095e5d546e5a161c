//! Slab-decomposed field storage and halo-buffered stencil interpolation.
//!
//! A periodic 3-D grid of `nx × ny × nz` cells carrying `components`
//! values per cell is split along z into contiguous slabs, one per rank
//! ([`SlabLayout`]). Each rank keeps two time generations of its slab,
//! padded above and below with halo planes copied from its z-neighbours
//! ([`HaloPair`]), so that a `(2N+2)`-point stencil centred anywhere in
//! the slab can be evaluated without further communication
//! ([`HaloInterpolator`]).
//!
//! Interpolation weights come from a [`BasisWeights`] implementation;
//! [`LagrangeBasis`] is the bundled reference.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod basis;
pub mod halo;
pub mod interpolator;
pub mod layout;

pub use basis::{BasisWeights, LagrangeBasis, MAX_HALF_WIDTH};
pub use halo::{HaloBuffer, HaloPair};
pub use interpolator::{GridPoint, HaloInterpolator};
pub use layout::{GridShape, LocalSlab, SlabLayout};
