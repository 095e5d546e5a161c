//! Lagrangian tracer particles on a slab-decomposed field.
//!
//! Each rank holds the particles whose slab-axis coordinate lies in its
//! slab ([`ParticleState`]). A step evaluates the field at every particle
//! through the halo-buffered interpolator, advances positions with
//! Adams-Bashforth ([`AdamsBashforth`]), and re-homes particles that left
//! the slab ([`Redistributor`]). [`SlabParticleSystem`] runs that loop
//! behind the [`ParticleSystem`] trait.
//!
//! # Quick start
//!
//! ```no_run
//! use slabtrace_comm::LocalCluster;
//! use slabtrace_field::{GridShape, LagrangeBasis, SlabLayout};
//! use slabtrace_particles::{
//!     seed_owned, ParticleSystem, PartitionClassifier, Redistributor, SlabParticleSystem,
//!     SystemConfig,
//! };
//!
//! let transport = LocalCluster::endpoints(1).remove(0);
//! let config = SystemConfig { box_size: [1.0; 3], ..SystemConfig::default() };
//! let layout = SlabLayout::even(GridShape::new(8, 8, 8), 3, 1).unwrap();
//! let field = vec![0.0f64; layout.global_len()];
//!
//! let classifier = PartitionClassifier::new(0.0, 1.0, 8).unwrap();
//! let router = Redistributor::new(classifier, &layout, slabtrace_core::Rank(0)).unwrap();
//! let particles = seed_owned::<f64>(100, config.box_size, 7, &router, 4).unwrap();
//!
//! let basis = LagrangeBasis::new(1).unwrap();
//! let mut system =
//!     SlabParticleSystem::new(config, layout, basis, &field, particles, transport).unwrap();
//! let report = system.complete_loop().unwrap();
//! assert_eq!(report.local_count, 100);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod classify;
pub mod config;
pub mod integrator;
pub mod metrics;
pub mod redistribute;
pub mod seed;
pub mod state;
pub mod system;

pub use classify::PartitionClassifier;
pub use config::{ConfigError, SystemConfig};
pub use integrator::{AdamsBashforth, MAX_ORDER};
pub use metrics::StepReport;
pub use redistribute::{ExchangeStats, PartitionTable, Redistributor};
pub use seed::{seed_owned, uniform_positions};
pub use state::{ParticleState, RhsHistory};
pub use system::{ParticleSystem, SlabParticleSystem, SystemState};
