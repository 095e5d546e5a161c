//! Dataset storage, particle checkpoints, and field snapshots.
//!
//! # Architecture
//!
//! - [`codec`] encodes flat arrays of reals or ids into self-describing
//!   datasets
//! - [`DatasetStore`] maps names to encoded datasets; [`MemoryStore`]
//!   and [`DirectoryStore`] implement it
//! - [`ParticleCheckpoint`] saves and restores positions, ids, and every
//!   history slot of a species
//! - [`FieldSnapshot`] saves a global field and hands each rank its slab
//!
//! Collective saves gather onto rank 0 over the same [`Transport`]
//! the particle system uses.
//!
//! # Format
//!
//! ```text
//! [MAGIC "SLBT"] [VERSION u8] [ELEMENT u8] [COUNT u64] [VALUES ...]
//! ```
//!
//! [`Transport`]: slabtrace_comm::Transport

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod codec;
pub mod error;
pub mod store;

pub use checkpoint::{gather_particles, FieldSnapshot, ParticleCheckpoint, ROOT};
pub use error::StoreError;
pub use store::{
    get_reals, get_u64s, put_reals, put_u64s, validate_name, DatasetStore, DirectoryStore,
    MemoryStore,
};

/// Magic bytes at the start of every dataset.
pub const MAGIC: [u8; 4] = *b"SLBT";

/// Current binary format version.
pub const FORMAT_VERSION: u8 = 1;
