//! Message envelopes.

use std::fmt;

use slabtrace_core::Rank;

/// Protocol phase a message belongs to.
///
/// Each phase is entered by every rank in the same relative order, so a
/// `(phase, source, destination)` triple identifies one logical message
/// stream. Tag uniqueness is a protocol invariant: no two phases share a
/// variant, and no phase sends twice between the same pair of ranks
/// without the receiver consuming the first message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Topmost slab planes travelling to the next higher slab, where they
    /// fill the lower halo.
    HaloUpward,
    /// Bottommost slab planes travelling to the next lower slab, where
    /// they fill the upper halo.
    HaloDownward,
    /// Particle batches routed to their new owning rank.
    Redistribute,
    /// Local counts exchanged for a global sum.
    CountReduce,
    /// Per-rank contributions collected on a root rank.
    Gather,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HaloUpward => write!(f, "halo-upward"),
            Self::HaloDownward => write!(f, "halo-downward"),
            Self::Redistribute => write!(f, "redistribute"),
            Self::CountReduce => write!(f, "count-reduce"),
            Self::Gather => write!(f, "gather"),
        }
    }
}

/// Routing key for one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Envelope {
    /// Protocol phase.
    pub phase: Phase,
    /// Sending rank.
    pub source: Rank,
    /// Receiving rank.
    pub destination: Rank,
}

impl Envelope {
    /// Build an envelope.
    pub fn new(phase: Phase, source: Rank, destination: Rank) -> Self {
        Self {
            phase,
            source,
            destination,
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.phase, self.source, self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn envelopes_are_unique_per_phase_and_pair() {
        let phases = [
            Phase::HaloUpward,
            Phase::HaloDownward,
            Phase::Redistribute,
            Phase::CountReduce,
            Phase::Gather,
        ];
        let mut seen = HashSet::new();
        for phase in phases {
            for src in 0..4 {
                for dst in 0..4 {
                    assert!(seen.insert(Envelope::new(phase, Rank(src), Rank(dst))));
                }
            }
        }
        assert_eq!(seen.len(), phases.len() * 4 * 4);
    }

    #[test]
    fn display_is_compact() {
        let e = Envelope::new(Phase::Redistribute, Rank(0), Rank(3));
        assert_eq!(e.to_string(), "redistribute:0->3");
    }
}
