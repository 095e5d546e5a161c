//! Envelope-tagged point-to-point transport between slabtrace ranks.
//!
//! Every exchange in slabtrace (halo refresh, particle redistribution,
//! count reduction, checkpoint gathers) goes through the [`Transport`]
//! trait. Messages are addressed by an [`Envelope`] of
//! `(phase, source, destination)`; envelopes are unique per protocol
//! phase and pair of ranks, and messages sharing an envelope are
//! delivered in send order.
//!
//! # Backends
//!
//! - [`ChannelTransport`]: in-process ranks connected by
//!   `crossbeam-channel`, built with [`LocalCluster`].
//!
//! Payloads are opaque little-endian byte packets; [`wire`] provides the
//! writer/reader pair used to build and decode them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod envelope;
pub mod transport;
pub mod wire;

pub use channel::{ChannelTransport, LocalCluster};
pub use envelope::{Envelope, Phase};
pub use transport::{all_reduce_sum, exchange, gather, Transport};
pub use wire::{PacketReader, PacketWriter};
