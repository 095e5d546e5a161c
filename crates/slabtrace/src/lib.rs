//! slabtrace: Lagrangian tracer particles in slab-decomposed periodic
//! vector fields.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all slabtrace sub-crates. For most users, adding `slabtrace` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use slabtrace::prelude::*;
//!
//! // One rank, a uniform upward flow on an 8³ grid.
//! let transport = LocalCluster::endpoints(1).remove(0);
//! let layout = SlabLayout::even(GridShape::new(8, 8, 8), 3, 1).unwrap();
//! let field: Vec<f64> = (0..layout.global_len())
//!     .map(|i| if i % 3 == 2 { 1.0 } else { 0.0 })
//!     .collect();
//! let config = SystemConfig {
//!     box_size: [1.0; 3],
//!     integration_order: 2,
//!     dt: 0.25,
//!     ..SystemConfig::default()
//! };
//!
//! let classifier = PartitionClassifier::new(0.0, 1.0, 8).unwrap();
//! let router = Redistributor::new(classifier, &layout, Rank(0)).unwrap();
//! let particles = ParticleState::with_positions(
//!     vec![ParticleId(0)],
//!     vec![[0.5f64, 0.5, 0.875]],
//!     config.integration_order,
//! )
//! .unwrap();
//! assert!(router.owns_position(0.875f64));
//!
//! let basis = LagrangeBasis::new(1).unwrap();
//! let mut system =
//!     SlabParticleSystem::new(config, layout, basis, &field, particles, transport).unwrap();
//! system.complete_loop().unwrap();
//!
//! // 0.875 + 0.25 wraps to 0.125.
//! let z = system.particles().unwrap().positions()[0][2];
//! assert!((z - 0.125).abs() < 1e-12);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `slabtrace-core` | IDs, the `Real` trait, error enums |
//! | [`comm`] | `slabtrace-comm` | Transport trait, envelopes, in-process cluster |
//! | [`field`] | `slabtrace-field` | Slab layouts, bases, halo-buffered interpolation |
//! | [`particles`] | `slabtrace-particles` | Particle state, redistribution, integration, orchestration |
//! | [`store`] | `slabtrace-store` | Dataset codec, stores, checkpoints |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, IDs, and errors (`slabtrace-core`).
///
/// Contains [`types::Real`], the strongly-typed IDs, and the error enums
/// [`types::CommError`], [`types::FieldError`], and [`types::StepError`].
pub use slabtrace_core as types;

/// Point-to-point transport (`slabtrace-comm`).
///
/// The [`comm::Transport`] trait and the in-process
/// [`comm::LocalCluster`] backend.
pub use slabtrace_comm as comm;

/// Field layouts and interpolation (`slabtrace-field`).
///
/// [`field::SlabLayout`] deals grid planes to ranks;
/// [`field::HaloInterpolator`] evaluates a field anywhere in a rank's slab.
pub use slabtrace_field as field;

/// Particle state and stepping (`slabtrace-particles`).
///
/// [`particles::SlabParticleSystem`] runs the compute, move, and
/// redistribute loop.
pub use slabtrace_particles as particles;

/// Persistence (`slabtrace-store`).
///
/// Save and restore runs with [`store::ParticleCheckpoint`] and
/// [`store::FieldSnapshot`] over any [`store::DatasetStore`].
pub use slabtrace_store as store;

/// Common imports for typical slabtrace usage.
///
/// ```rust
/// use slabtrace::prelude::*;
/// ```
pub mod prelude {
    // Core types and errors
    pub use slabtrace_core::{
        CommError, ErrorKind, FieldError, ParticleId, Rank, Real, StepError, StepIndex,
    };

    // Transport
    pub use slabtrace_comm::{ChannelTransport, LocalCluster, Transport};

    // Field
    pub use slabtrace_field::{
        BasisWeights, GridPoint, GridShape, HaloInterpolator, LagrangeBasis, SlabLayout,
    };

    // Particles
    pub use slabtrace_particles::{
        seed_owned, ParticleState, ParticleSystem, PartitionClassifier, Redistributor,
        SlabParticleSystem, StepReport, SystemConfig,
    };

    // Persistence
    pub use slabtrace_store::{
        DatasetStore, DirectoryStore, FieldSnapshot, MemoryStore, ParticleCheckpoint, StoreError,
    };
}
