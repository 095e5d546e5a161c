//! In-process transport over `crossbeam-channel`.
//!
//! [`LocalCluster::endpoints`] builds one [`ChannelTransport`] per rank, wired
//! with a dedicated unbounded channel for every ordered pair of ranks.
//! Dedicated pair channels mean a receive from rank `s` fails with
//! [`CommError::Disconnected`] as soon as `s` drops its endpoint, instead
//! of waiting on traffic from unrelated ranks.

use std::collections::VecDeque;

use crossbeam_channel::{unbounded, Receiver, Sender};
use indexmap::IndexMap;
use slabtrace_core::{CommError, Rank};
use tracing::trace;

use crate::envelope::Envelope;
use crate::transport::Transport;

type Message = (Envelope, Vec<u8>);

/// Namespace for building a connected group of in-process endpoints.
pub struct LocalCluster;

impl LocalCluster {
    /// Build `size` connected endpoints, indexed by rank.
    ///
    /// Each endpoint is `Send`; move one into each rank's thread.
    pub fn endpoints(size: usize) -> Vec<ChannelTransport> {
        // senders[src][dst] / receivers[dst][src]
        let mut senders: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Receiver<Message>>> = (0..size).map(|_| Vec::new()).collect();
        for outbox in senders.iter_mut() {
            for inboxes in receivers.iter_mut() {
                let (tx, rx) = unbounded();
                outbox.push(tx);
                inboxes.push(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| ChannelTransport {
                rank: Rank(rank),
                outboxes,
                inboxes,
                held: IndexMap::new(),
            })
            .collect()
    }
}

/// One rank's endpoint in a [`LocalCluster`].
pub struct ChannelTransport {
    rank: Rank,
    /// Indexed by destination rank.
    outboxes: Vec<Sender<Message>>,
    /// Indexed by source rank.
    inboxes: Vec<Receiver<Message>>,
    /// Packets that arrived before they were asked for.
    held: IndexMap<Envelope, VecDeque<Vec<u8>>>,
}

impl ChannelTransport {
    fn check_rank(&self, rank: Rank) -> Result<(), CommError> {
        if rank.0 >= self.outboxes.len() {
            return Err(CommError::UnknownRank {
                rank,
                size: self.outboxes.len(),
            });
        }
        Ok(())
    }

    /// Number of packets received but not yet consumed.
    pub fn held_count(&self) -> usize {
        self.held.values().map(VecDeque::len).sum()
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn send(&mut self, envelope: Envelope, packet: Vec<u8>) -> Result<(), CommError> {
        if envelope.source != self.rank {
            return Err(CommError::Misaddressed {
                expected: self.rank,
                found: envelope.source,
            });
        }
        self.check_rank(envelope.destination)?;
        trace!(%envelope, bytes = packet.len(), "send");
        self.outboxes[envelope.destination.0]
            .send((envelope, packet))
            .map_err(|_| CommError::Disconnected {
                peer: envelope.destination,
            })
    }

    fn recv(&mut self, envelope: Envelope) -> Result<Vec<u8>, CommError> {
        if envelope.destination != self.rank {
            return Err(CommError::Misaddressed {
                expected: self.rank,
                found: envelope.destination,
            });
        }
        self.check_rank(envelope.source)?;
        if let Some(packet) = self.held.get_mut(&envelope).and_then(VecDeque::pop_front) {
            trace!(%envelope, bytes = packet.len(), "recv (held)");
            return Ok(packet);
        }
        loop {
            let (got, packet) = self.inboxes[envelope.source.0]
                .recv()
                .map_err(|_| CommError::Disconnected {
                    peer: envelope.source,
                })?;
            if got == envelope {
                trace!(%envelope, bytes = packet.len(), "recv");
                return Ok(packet);
            }
            self.held.entry(got).or_default().push_back(packet);
        }
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("rank", &self.rank)
            .field("size", &self.outboxes.len())
            .field("held", &self.held_count())
            .finish()
    }
}
