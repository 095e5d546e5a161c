//! Re-homing particles to the rank that owns their slab-axis partition.
//!
//! One pass has three phases:
//!
//! 1. **Bucket**: wrap each slab-axis coordinate into the box, classify
//!    it, and look up the owning rank.
//! 2. **Exchange**: every rank sends one batch (possibly empty) to every
//!    other rank. Particles travel straight to their owner, however far
//!    they moved, together with every history slot.
//! 3. **Compact**: retained particles keep their relative order, received
//!    batches are appended in source-rank order, and the result is stably
//!    sorted by partition to build the [`PartitionTable`].

use std::ops::Range;

use tracing::{debug, instrument, trace};

use slabtrace_comm::{Envelope, PacketReader, PacketWriter, Phase, Transport};
use slabtrace_core::{ParticleId, Rank, Real, StepError, StepIndex};
use slabtrace_field::{LocalSlab, SlabLayout};

use crate::classify::PartitionClassifier;
use crate::state::ParticleState;

/// Where each locally owned partition's particles sit in local order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionTable {
    first: usize,
    /// `partitions + 1` prefix offsets into the local arrays.
    offsets: Vec<usize>,
}

impl PartitionTable {
    /// Build from partition keys already sorted ascending, covering the
    /// global partitions `first..first + partitions`.
    fn from_sorted(first: usize, partitions: usize, keys: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(partitions + 1);
        let mut cursor = 0;
        for k in first..first + partitions {
            offsets.push(cursor);
            while cursor < keys.len() && keys[cursor] == k {
                cursor += 1;
            }
        }
        offsets.push(cursor);
        Self { first, offsets }
    }

    /// First global partition owned by this rank.
    pub fn first_partition(&self) -> usize {
        self.first
    }

    /// Number of partitions owned by this rank.
    pub fn partitions(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Local index range of the particles in global partition `k`.
    ///
    /// Empty for partitions this rank does not own.
    pub fn range(&self, k: usize) -> Range<usize> {
        match k.checked_sub(self.first) {
            Some(i) if i < self.partitions() => self.offsets[i]..self.offsets[i + 1],
            _ => 0..0,
        }
    }

    /// Particles in global partition `k`.
    pub fn count(&self, k: usize) -> usize {
        self.range(k).len()
    }

    /// Particles across all owned partitions.
    pub fn total(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// `(global partition, local range)` for every owned partition.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        self.offsets
            .windows(2)
            .enumerate()
            .map(move |(i, w)| (self.first + i, w[0]..w[1]))
    }
}

/// Particle traffic of one redistribution on one rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    /// Particles shipped to other ranks.
    pub sent: u64,
    /// Particles received from other ranks.
    pub received: u64,
    /// Particles that stayed.
    pub retained: u64,
}

/// Routes particles to their owning rank.
///
/// Partition `k` of the classifier is global field plane `k`, so the
/// field layout's plane owners are the partition owners.
#[derive(Clone, Debug)]
pub struct Redistributor {
    classifier: PartitionClassifier,
    owners: Vec<Rank>,
    slab: LocalSlab,
}

impl Redistributor {
    /// Redistributor for `rank`, with one partition per plane of `layout`.
    pub fn new(
        classifier: PartitionClassifier,
        layout: &SlabLayout,
        rank: Rank,
    ) -> Result<Self, StepError> {
        let nz = layout.shape().nz;
        if classifier.partitions() != nz {
            return Err(StepError::PreconditionViolation {
                reason: format!(
                    "classifier has {} partitions, field has {nz} planes",
                    classifier.partitions()
                ),
            });
        }
        let slab = layout.local(rank)?;
        let owners = (0..nz as i64).map(|k| layout.owner_of_plane(k)).collect();
        Ok(Self {
            classifier,
            owners,
            slab,
        })
    }

    /// The classifier in use.
    pub fn classifier(&self) -> &PartitionClassifier {
        &self.classifier
    }

    /// Rank owning global partition `k`.
    pub fn owner_of(&self, k: usize) -> Rank {
        self.owners[k]
    }

    /// Half-open slab-axis interval owned by this rank.
    pub fn owned_interval(&self) -> Range<f64> {
        self.classifier.bound(self.slab.start)..self.classifier.bound(self.slab.end())
    }

    /// Whether this rank owns the partition containing `z` (already wrapped).
    pub fn owns(&self, z: f64) -> bool {
        self.classifier
            .classify(z)
            .is_some_and(|k| self.slab.contains_plane(k))
    }

    /// Slab-axis coordinate `z` wrapped into the box at precision `R`,
    /// exactly as a redistribution stores it.
    pub fn wrap_stored<R: Real>(&self, z: R) -> R {
        let c = &self.classifier;
        let stored = R::cast(c.wrap(z.widen()));
        if stored.widen() >= c.low() + c.length() {
            R::cast(c.low())
        } else {
            stored
        }
    }

    /// Whether a particle at slab-axis coordinate `z` (any value) would be
    /// kept by this rank after a redistribution.
    pub fn owns_position<R: Real>(&self, z: R) -> bool {
        self.owns(self.wrap_stored(z).widen())
    }

    /// Wrap every slab-axis coordinate into the box and return each
    /// particle's partition.
    fn bucket<R: Real>(
        &self,
        state: &mut ParticleState<R>,
        step: StepIndex,
    ) -> Result<Vec<usize>, StepError> {
        let mut keys = Vec::with_capacity(state.len());
        for p in 0..state.len() {
            let z = state.positions()[p][2];
            if !z.is_finite() {
                return Err(StepError::NonFinitePosition {
                    id: state.ids()[p],
                    step,
                });
            }
            let stored = self.wrap_stored(z);
            state.positions_mut()[p][2] = stored;
            keys.push(self.classifier.classify(stored.widen()).unwrap_or(0));
        }
        Ok(keys)
    }

    /// Run one full pass. Collective over all ranks of `transport`.
    #[instrument(skip_all, name = "redistribute", fields(rank = self.slab.rank.0, step = step.0))]
    pub fn redistribute<R: Real, C: Transport + ?Sized>(
        &self,
        state: &mut ParticleState<R>,
        transport: &mut C,
        step: StepIndex,
    ) -> Result<(PartitionTable, ExchangeStats), StepError> {
        let me = self.slab.rank;
        let size = transport.size();
        let depth = state.history().depth();
        let keys = self.bucket(state, step)?;

        // 1. Pack departures per destination.
        let mut outgoing: Vec<u64> = vec![0; size];
        for &k in &keys {
            outgoing[self.owner_of(k).0] += 1;
        }
        let record = 8 + 3 * R::DTYPE.bytes() * (1 + depth);
        let mut writers: Vec<PacketWriter> = outgoing
            .iter()
            .map(|&n| {
                let mut w = PacketWriter::with_capacity(8 + n as usize * record);
                w.put_u64(n);
                w
            })
            .collect();
        let mut keep = Vec::with_capacity(keys.len());
        for (p, &k) in keys.iter().enumerate() {
            let dst = self.owner_of(k);
            keep.push(dst == me);
            if dst != me {
                let w = &mut writers[dst.0];
                w.put_u64(state.ids()[p].0);
                w.put_reals(&state.positions()[p]);
                for slot in state.history().slots() {
                    w.put_reals(&slot[p]);
                }
            }
        }

        // 2. Exchange with every other rank.
        let mut stats = ExchangeStats::default();
        for (dst, w) in writers.into_iter().enumerate() {
            if dst == me.0 {
                continue;
            }
            stats.sent += outgoing[dst];
            transport.send(Envelope::new(Phase::Redistribute, me, Rank(dst)), w.finish())?;
        }
        let mut kept_keys: Vec<usize> = keys
            .iter()
            .zip(&keep)
            .filter(|&(_, &k)| k)
            .map(|(&key, _)| key)
            .collect();
        state.retain_indices(&keep);
        stats.retained = state.len() as u64;

        let mut rhs = vec![[R::zero(); 3]; depth];
        for src in (0..size).filter(|&s| s != me.0) {
            let packet = transport.recv(Envelope::new(Phase::Redistribute, Rank(src), me))?;
            let mut r = PacketReader::new(&packet);
            let n = r.get_u64()?;
            for _ in 0..n {
                let id = ParticleId(r.get_u64()?);
                let mut pos = [R::zero(); 3];
                r.get_reals_exact(&mut pos)?;
                for v in rhs.iter_mut() {
                    r.get_reals_exact(v)?;
                }
                let k = self
                    .classifier
                    .classify(pos[2].widen())
                    .filter(|&k| self.slab.contains_plane(k))
                    .ok_or_else(|| StepError::PreconditionViolation {
                        reason: format!(
                            "particle {id} from rank {src} at z = {} is not owned by rank {me}",
                            pos[2]
                        ),
                    })?;
                state.push(id, pos, &rhs);
                kept_keys.push(k);
            }
            r.finish()?;
            trace!(from = src, particles = n, "batch received");
            stats.received += n;
        }

        // 3. Stable sort by partition.
        let mut order: Vec<usize> = (0..state.len()).collect();
        order.sort_by_key(|&i| kept_keys[i]);
        state.permute(&order);
        let sorted: Vec<usize> = order.iter().map(|&i| kept_keys[i]).collect();
        let table = PartitionTable::from_sorted(self.slab.start, self.slab.planes, &sorted);

        debug!(
            sent = stats.sent,
            received = stats.received,
            local = state.len(),
            "redistributed"
        );
        Ok((table, stats))
    }
}
