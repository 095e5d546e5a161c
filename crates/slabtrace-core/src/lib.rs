//! Core types and traits for slabtrace.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by every other slabtrace crate: strongly-typed IDs,
//! the [`Real`] numeric trait used to specialise storage precision, and
//! the error enums for transport, field, and step failures.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod real;

pub use error::{CommError, ErrorKind, FieldError, StepError};
pub use id::{ParticleId, Rank, StepIndex};
pub use real::{DType, Real};

/// Index of the slab (decomposition) axis in a `[x, y, z]` position.
pub const SLAB_AXIS: usize = 2;
