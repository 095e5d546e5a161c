//! Rank-local particle arrays and their velocity history.
//!
//! All arrays are co-indexed by local particle order: particle `p` has id
//! `ids[p]`, position `positions[p]`, and history value `slot(i)[p]` for
//! every slot `i`. Operations that reorder particles move every array
//! together.

use std::collections::HashSet;

use slabtrace_core::{ParticleId, Real, StepError};

/// Newest-first ring of per-particle velocity evaluations.
///
/// `depth` slots, each with one `[R; 3]` per local particle. Slot 0 holds
/// the latest evaluation, or zeros while waiting for the next compute.
#[derive(Clone, Debug, PartialEq)]
pub struct RhsHistory<R> {
    slots: Vec<Vec<[R; 3]>>,
}

impl<R: Real> RhsHistory<R> {
    /// `depth` zero-filled slots for `count` particles.
    pub fn new(depth: usize, count: usize) -> Self {
        Self {
            slots: (0..depth).map(|_| vec![[R::zero(); 3]; count]).collect(),
        }
    }

    /// Drop the oldest slot, age the others by one, zero slot 0.
    ///
    /// The oldest slot's storage is reused as the new slot 0.
    pub fn shift(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        self.slots.rotate_right(1);
        self.slots[0].fill([R::zero(); 3]);
    }

    fn push(&mut self, values: &[[R; 3]]) {
        for (slot, v) in self.slots.iter_mut().zip(values) {
            slot.push(*v);
        }
    }
}

impl<R> RhsHistory<R> {
    /// Number of slots.
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Slot `i` (0 = newest).
    pub fn slot(&self, i: usize) -> &[[R; 3]] {
        &self.slots[i]
    }

    /// Mutable slot `i`.
    pub fn slot_mut(&mut self, i: usize) -> &mut [[R; 3]] {
        &mut self.slots[i]
    }

    /// All slots, newest first.
    pub fn slots(&self) -> &[Vec<[R; 3]>] {
        &self.slots
    }
}

/// The particles held by one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleState<R> {
    ids: Vec<ParticleId>,
    positions: Vec<[R; 3]>,
    history: RhsHistory<R>,
}

impl<R: Real> ParticleState<R> {
    /// No particles, `depth` history slots.
    pub fn empty(depth: usize) -> Self {
        Self {
            ids: Vec::new(),
            positions: Vec::new(),
            history: RhsHistory::new(depth, 0),
        }
    }

    /// Particles with zeroed history.
    pub fn with_positions(
        ids: Vec<ParticleId>,
        positions: Vec<[R; 3]>,
        depth: usize,
    ) -> Result<Self, StepError> {
        let count = positions.len();
        Self::from_parts(ids, positions, RhsHistory::new(depth, count).slots)
    }

    /// Assemble from co-indexed arrays, one history vector per slot.
    ///
    /// Fails on length mismatches or duplicate ids.
    pub fn from_parts(
        ids: Vec<ParticleId>,
        positions: Vec<[R; 3]>,
        slots: Vec<Vec<[R; 3]>>,
    ) -> Result<Self, StepError> {
        if ids.len() != positions.len() {
            return Err(StepError::PreconditionViolation {
                reason: format!("{} ids for {} positions", ids.len(), positions.len()),
            });
        }
        if let Some((i, s)) = slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != positions.len())
        {
            return Err(StepError::PreconditionViolation {
                reason: format!(
                    "history slot {i} has {} entries for {} positions",
                    s.len(),
                    positions.len()
                ),
            });
        }
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(&id) = ids.iter().find(|&&id| !seen.insert(id)) {
            return Err(StepError::DuplicateParticle { id });
        }
        Ok(Self {
            ids,
            positions,
            history: RhsHistory { slots },
        })
    }

    /// Append one particle with its history values (one per slot).
    pub(crate) fn push(&mut self, id: ParticleId, position: [R; 3], rhs: &[[R; 3]]) {
        debug_assert_eq!(rhs.len(), self.history.depth());
        self.ids.push(id);
        self.positions.push(position);
        self.history.push(rhs);
    }

    /// Keep particles whose index satisfies `keep`, preserving order.
    pub(crate) fn retain_indices(&mut self, keep: &[bool]) {
        debug_assert_eq!(keep.len(), self.len());
        retain_by(&mut self.ids, keep);
        retain_by(&mut self.positions, keep);
        for slot in &mut self.history.slots {
            retain_by(slot, keep);
        }
    }

    /// Reorder so that new index `i` holds old index `order[i]`.
    pub(crate) fn permute(&mut self, order: &[usize]) {
        debug_assert_eq!(order.len(), self.len());
        self.ids = order.iter().map(|&i| self.ids[i]).collect();
        self.positions = order.iter().map(|&i| self.positions[i]).collect();
        for slot in &mut self.history.slots {
            *slot = order.iter().map(|&i| slot[i]).collect();
        }
    }

    /// Keep only particles whose position satisfies `owned`.
    pub fn retain_owned<F: Fn(&[R; 3]) -> bool>(&mut self, owned: F) {
        let keep: Vec<bool> = self.positions.iter().map(owned).collect();
        self.retain_indices(&keep);
    }
}

impl<R> ParticleState<R> {
    /// Local particle count.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no particles are held.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Particle ids.
    pub fn ids(&self) -> &[ParticleId] {
        &self.ids
    }

    /// Positions `[x, y, z]`.
    pub fn positions(&self) -> &[[R; 3]] {
        &self.positions
    }

    /// Mutable positions.
    pub fn positions_mut(&mut self) -> &mut [[R; 3]] {
        &mut self.positions
    }

    /// Velocity history.
    pub fn history(&self) -> &RhsHistory<R> {
        &self.history
    }

    /// Mutable velocity history.
    pub fn history_mut(&mut self) -> &mut RhsHistory<R> {
        &mut self.history
    }

    /// Positions and history borrowed together.
    pub fn positions_and_history_mut(&mut self) -> (&mut [[R; 3]], &mut RhsHistory<R>) {
        (&mut self.positions, &mut self.history)
    }

    /// Split into `(ids, positions, history slots)`.
    pub fn into_parts(self) -> (Vec<ParticleId>, Vec<[R; 3]>, Vec<Vec<[R; 3]>>) {
        (self.ids, self.positions, self.history.slots)
    }
}

fn retain_by<T>(v: &mut Vec<T>, keep: &[bool]) {
    let mut flags = keep.iter();
    v.retain(|_| flags.next().copied().unwrap_or(false));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[u64]) -> Vec<ParticleId> {
        v.iter().map(|&i| ParticleId(i)).collect()
    }

    #[test]
    fn shift_ages_slots_and_zeroes_newest() {
        let mut h = RhsHistory::<f64>::new(3, 1);
        h.slot_mut(0)[0] = [1.0; 3];
        h.slot_mut(1)[0] = [2.0; 3];
        h.slot_mut(2)[0] = [3.0; 3];
        h.shift();
        assert_eq!(h.slot(0)[0], [0.0; 3]);
        assert_eq!(h.slot(1)[0], [1.0; 3]);
        assert_eq!(h.slot(2)[0], [2.0; 3]);
    }

    #[test]
    fn from_parts_rejects_duplicates_and_mismatches() {
        let pos = vec![[0.0f64; 3]; 2];
        assert_eq!(
            ParticleState::from_parts(ids(&[4, 4]), pos.clone(), vec![]).err(),
            Some(StepError::DuplicateParticle { id: ParticleId(4) })
        );
        assert!(ParticleState::from_parts(ids(&[1]), pos.clone(), vec![]).is_err());
        assert!(
            ParticleState::from_parts(ids(&[1, 2]), pos, vec![vec![[0.0; 3]; 1]]).is_err()
        );
    }

    #[test]
    fn permute_moves_every_array_together() {
        let mut s = ParticleState::with_positions(
            ids(&[10, 11, 12]),
            vec![[0.0f64; 3], [1.0; 3], [2.0; 3]],
            2,
        )
        .unwrap();
        for p in 0..3 {
            s.history_mut().slot_mut(1)[p] = [p as f64 * 10.0; 3];
        }
        s.permute(&[2, 0, 1]);
        assert_eq!(s.ids(), &ids(&[12, 10, 11])[..]);
        assert_eq!(s.positions()[0], [2.0; 3]);
        assert_eq!(s.history().slot(1)[0], [20.0; 3]);
        assert_eq!(s.history().slot(1)[1], [0.0; 3]);
    }

    #[test]
    fn retain_owned_filters_in_order() {
        let mut s = ParticleState::with_positions(
            ids(&[0, 1, 2, 3]),
            vec![[0.0f32, 0.0, 1.0], [0.0, 0.0, 6.0], [0.0, 0.0, 2.0], [0.0, 0.0, 9.0]],
            1,
        )
        .unwrap();
        s.retain_owned(|p| p[2] < 5.0);
        assert_eq!(s.ids(), &ids(&[0, 2])[..]);
        assert_eq!(s.history().slot(0).len(), 2);
    }
}
