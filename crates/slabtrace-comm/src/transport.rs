//! The [`Transport`] trait and collective helpers built on it.

use slabtrace_core::{CommError, Rank};
use tracing::trace;

use crate::envelope::{Envelope, Phase};
use crate::wire::{PacketReader, PacketWriter};

/// Blocking point-to-point transport for one rank.
///
/// Both operations are synchronous. Every rank must enter matching
/// sends and receives in the same relative order or the group
/// deadlocks; there is no timeout or cancellation.
///
/// `send` must not block on the receiver (buffered semantics), so a
/// rank may post all of its sends for a phase before receiving.
pub trait Transport: Send {
    /// Rank of this endpoint.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send `packet` under `envelope`.
    ///
    /// `envelope.source` must equal [`rank()`](Transport::rank).
    fn send(&mut self, envelope: Envelope, packet: Vec<u8>) -> Result<(), CommError>;

    /// Receive the next packet sent under `envelope`.
    ///
    /// `envelope.destination` must equal [`rank()`](Transport::rank).
    /// Packets that arrive for other envelopes are held until asked for.
    fn recv(&mut self, envelope: Envelope) -> Result<Vec<u8>, CommError>;
}

/// Send `packet` to `peer` and receive the complementary packet from
/// `from`, both in `phase`.
pub fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    phase: Phase,
    peer: Rank,
    packet: Vec<u8>,
    from: Rank,
) -> Result<Vec<u8>, CommError> {
    let me = transport.rank();
    transport.send(Envelope::new(phase, me, peer), packet)?;
    transport.recv(Envelope::new(phase, from, me))
}

/// Sum a `u64` across all ranks; every rank receives the same total.
///
/// Contributions are added in rank order so the result is independent
/// of arrival order.
pub fn all_reduce_sum<T: Transport + ?Sized>(transport: &mut T, value: u64) -> Result<u64, CommError> {
    let me = transport.rank();
    let size = transport.size();
    for dst in 0..size {
        if dst == me.0 {
            continue;
        }
        let mut w = PacketWriter::new();
        w.put_u64(value);
        transport.send(Envelope::new(Phase::CountReduce, me, Rank(dst)), w.finish())?;
    }
    let mut total = 0u64;
    for src in 0..size {
        let contribution = if src == me.0 {
            value
        } else {
            let packet = transport.recv(Envelope::new(Phase::CountReduce, Rank(src), me))?;
            let mut r = PacketReader::new(&packet);
            let v = r.get_u64()?;
            r.finish()?;
            v
        };
        total += contribution;
    }
    trace!(rank = %me, local = value, total, "all_reduce_sum");
    Ok(total)
}

/// Collect one packet from every rank on `root`.
///
/// `root` receives `Some` with the packets in rank order (its own
/// included); every other rank receives `None`.
pub fn gather<T: Transport + ?Sized>(
    transport: &mut T,
    root: Rank,
    packet: Vec<u8>,
) -> Result<Option<Vec<Vec<u8>>>, CommError> {
    let me = transport.rank();
    let size = transport.size();
    if root.0 >= size {
        return Err(CommError::UnknownRank { rank: root, size });
    }
    if me != root {
        transport.send(Envelope::new(Phase::Gather, me, root), packet)?;
        return Ok(None);
    }
    let mut packets = Vec::with_capacity(size);
    for src in 0..me.0 {
        packets.push(transport.recv(Envelope::new(Phase::Gather, Rank(src), me))?);
    }
    packets.push(packet);
    for src in me.0 + 1..size {
        packets.push(transport.recv(Envelope::new(Phase::Gather, Rank(src), me))?);
    }
    trace!(rank = %me, packets = packets.len(), "gather");
    Ok(Some(packets))
}
