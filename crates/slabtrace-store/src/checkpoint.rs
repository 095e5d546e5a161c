//! Particle checkpoints and field snapshots.
//!
//! A particle checkpoint of species `s` at iteration `i` is stored as
//!
//! ```text
//! s/state/i        positions, flattened [x, y, z] per particle
//! s/index/i        particle ids
//! s/rhs/i/0 ..     one dataset per history slot, newest first
//! ```
//!
//! with particles sorted by id, so the datasets do not depend on how many
//! ranks wrote them. A field snapshot is one flattened global array
//! stored under `name/i`.

use tracing::{debug, instrument};

use slabtrace_comm::{gather, PacketReader, PacketWriter, Transport};
use slabtrace_core::{ParticleId, Rank, Real};
use slabtrace_field::SlabLayout;
use slabtrace_particles::{ParticleState, Redistributor};

use crate::error::StoreError;
use crate::store::{get_reals, get_u64s, put_reals, put_u64s, validate_name, DatasetStore};

/// Rank that assembles and writes collective checkpoints.
pub const ROOT: Rank = Rank(0);

// ── Particles ──────────────────────────────────────────────────────

/// Checkpoint layout for one particle species.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticleCheckpoint {
    species: String,
}

impl ParticleCheckpoint {
    /// Checkpoints stored under `species/...`.
    pub fn new(species: impl Into<String>) -> Result<Self, StoreError> {
        let species = species.into();
        validate_name(&species)?;
        Ok(Self { species })
    }

    /// Species name.
    pub fn species(&self) -> &str {
        &self.species
    }

    /// Dataset name of the positions at `iter`.
    pub fn state_name(&self, iter: u64) -> String {
        format!("{}/state/{iter}", self.species)
    }

    /// Dataset name of the ids at `iter`.
    pub fn index_name(&self, iter: u64) -> String {
        format!("{}/index/{iter}", self.species)
    }

    /// Dataset name of history slot `slot` at `iter`.
    pub fn rhs_name(&self, iter: u64, slot: usize) -> String {
        format!("{}/rhs/{iter}/{slot}", self.species)
    }

    /// Write `particles` as the checkpoint for `iter`.
    pub fn write<S, R>(
        &self,
        store: &mut S,
        iter: u64,
        particles: &ParticleState<R>,
    ) -> Result<(), StoreError>
    where
        S: DatasetStore + ?Sized,
        R: Real,
    {
        let mut order: Vec<usize> = (0..particles.len()).collect();
        order.sort_by_key(|&i| particles.ids()[i]);

        let ids: Vec<u64> = order.iter().map(|&i| particles.ids()[i].0).collect();
        put_u64s(store, &self.index_name(iter), &ids)?;
        put_reals(store, &self.state_name(iter), &flatten(particles.positions(), &order))?;
        for (slot, values) in particles.history().slots().iter().enumerate() {
            put_reals(store, &self.rhs_name(iter, slot), &flatten(values, &order))?;
        }
        debug!(
            species = %self.species,
            iter,
            particles = ids.len(),
            slots = particles.history().depth(),
            "checkpoint written"
        );
        Ok(())
    }

    /// Read the full checkpoint for `iter` with `depth` history slots.
    pub fn read<S, R>(
        &self,
        store: &S,
        iter: u64,
        depth: usize,
    ) -> Result<ParticleState<R>, StoreError>
    where
        S: DatasetStore + ?Sized,
        R: Real,
    {
        let ids: Vec<ParticleId> = get_u64s(store, &self.index_name(iter))?
            .into_iter()
            .map(ParticleId)
            .collect();
        let positions = unflatten(
            get_reals(store, &self.state_name(iter))?,
            ids.len(),
            "positions",
        )?;
        let slots = (0..depth)
            .map(|slot| {
                unflatten(
                    get_reals(store, &self.rhs_name(iter, slot))?,
                    ids.len(),
                    "history slot",
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParticleState::from_parts(ids, positions, slots)?)
    }

    /// Read the checkpoint for `iter` and keep the particles
    /// `redistributor`'s rank owns.
    ///
    /// Every rank may call this on the same store; together they hold
    /// each stored particle exactly once.
    pub fn read_owned<S, R>(
        &self,
        store: &S,
        iter: u64,
        depth: usize,
        redistributor: &Redistributor,
    ) -> Result<ParticleState<R>, StoreError>
    where
        S: DatasetStore + ?Sized,
        R: Real,
    {
        let mut particles = self.read::<S, R>(store, iter, depth)?;
        particles.retain_owned(|p| redistributor.owns_position(p[2]));
        Ok(particles)
    }

    /// Gather every rank's particles on [`ROOT`] and write them there.
    /// Collective.
    ///
    /// Only the root rank writes to its `store`; other ranks leave theirs
    /// untouched.
    #[instrument(
        skip_all,
        name = "checkpoint_save",
        fields(rank = transport.rank().0, iter = iter)
    )]
    pub fn save<S, R, C>(
        &self,
        store: &mut S,
        iter: u64,
        particles: &ParticleState<R>,
        transport: &mut C,
    ) -> Result<(), StoreError>
    where
        S: DatasetStore + ?Sized,
        R: Real,
        C: Transport + ?Sized,
    {
        match gather_particles(particles, transport)? {
            Some(all) => self.write(store, iter, &all),
            None => Ok(()),
        }
    }
}

/// Collect every rank's particles on [`ROOT`]. Collective.
///
/// The root receives the union, in rank order; other ranks receive
/// `None`. Duplicate ids across ranks are reported as an error.
pub fn gather_particles<R, C>(
    particles: &ParticleState<R>,
    transport: &mut C,
) -> Result<Option<ParticleState<R>>, StoreError>
where
    R: Real,
    C: Transport + ?Sized,
{
    let depth = particles.history().depth();
    let mut w = PacketWriter::new();
    w.put_u64(particles.len() as u64);
    for (p, id) in particles.ids().iter().enumerate() {
        w.put_u64(id.0);
        w.put_reals(&particles.positions()[p]);
        for slot in particles.history().slots() {
            w.put_reals(&slot[p]);
        }
    }
    let Some(packets) = gather(transport, ROOT, w.finish())? else {
        return Ok(None);
    };

    let mut ids = Vec::new();
    let mut positions = Vec::new();
    let mut slots: Vec<Vec<[R; 3]>> = vec![Vec::new(); depth];
    for packet in &packets {
        let mut r = PacketReader::new(packet);
        let count = r.get_u64()?;
        for _ in 0..count {
            ids.push(ParticleId(r.get_u64()?));
            let mut pos = [R::zero(); 3];
            r.get_reals_exact(&mut pos)?;
            positions.push(pos);
            for slot in &mut slots {
                let mut v = [R::zero(); 3];
                r.get_reals_exact(&mut v)?;
                slot.push(v);
            }
        }
        r.finish()?;
    }
    Ok(Some(ParticleState::from_parts(ids, positions, slots)?))
}

fn flatten<R: Copy>(values: &[[R; 3]], order: &[usize]) -> Vec<R> {
    order.iter().flat_map(|&i| values[i]).collect()
}

fn unflatten<R: Copy>(flat: Vec<R>, count: usize, what: &str) -> Result<Vec<[R; 3]>, StoreError> {
    if flat.len() != 3 * count {
        return Err(StoreError::MalformedDataset {
            detail: format!("{what} hold {} values for {count} particles", flat.len()),
        });
    }
    Ok(flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

// ── Fields ─────────────────────────────────────────────────────────

/// Snapshot layout for one field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSnapshot {
    name: String,
}

impl FieldSnapshot {
    /// Snapshots stored under `name/...`.
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name })
    }

    /// Dataset name at `iter`.
    pub fn dataset_name(&self, iter: u64) -> String {
        format!("{}/{iter}", self.name)
    }

    /// Write a flattened global snapshot.
    pub fn write_global<S, T>(
        &self,
        store: &mut S,
        iter: u64,
        layout: &SlabLayout,
        global: &[T],
    ) -> Result<(), StoreError>
    where
        S: DatasetStore + ?Sized,
        T: Real,
    {
        if global.len() != layout.global_len() {
            return Err(StoreError::MalformedDataset {
                detail: format!(
                    "snapshot has {} values, layout needs {}",
                    global.len(),
                    layout.global_len()
                ),
            });
        }
        put_reals(store, &self.dataset_name(iter), global)
    }

    /// Read the whole snapshot at `iter`.
    pub fn read_global<S, T>(
        &self,
        store: &S,
        iter: u64,
        layout: &SlabLayout,
    ) -> Result<Vec<T>, StoreError>
    where
        S: DatasetStore + ?Sized,
        T: Real,
    {
        let global: Vec<T> = get_reals(store, &self.dataset_name(iter))?;
        if global.len() != layout.global_len() {
            return Err(StoreError::MalformedDataset {
                detail: format!(
                    "snapshot has {} values, layout needs {}",
                    global.len(),
                    layout.global_len()
                ),
            });
        }
        Ok(global)
    }

    /// Read `rank`'s slab of the snapshot at `iter`.
    pub fn read_local<S, T>(
        &self,
        store: &S,
        iter: u64,
        layout: &SlabLayout,
        rank: Rank,
    ) -> Result<Vec<T>, StoreError>
    where
        S: DatasetStore + ?Sized,
        T: Real,
    {
        let global: Vec<T> = get_reals(store, &self.dataset_name(iter))?;
        Ok(layout.local_slice(&global, rank)?.to_vec())
    }

    /// Gather every rank's slab on [`ROOT`] and write the assembled
    /// snapshot there. Collective.
    #[instrument(
        skip_all,
        name = "snapshot_save",
        fields(rank = transport.rank().0, iter = iter)
    )]
    pub fn save<S, T, C>(
        &self,
        store: &mut S,
        iter: u64,
        layout: &SlabLayout,
        local: &[T],
        transport: &mut C,
    ) -> Result<(), StoreError>
    where
        S: DatasetStore + ?Sized,
        T: Real,
        C: Transport + ?Sized,
    {
        let me = transport.rank();
        let expected = layout.local_len(me)?;
        if local.len() != expected {
            return Err(StoreError::MalformedDataset {
                detail: format!(
                    "slab of rank {me} has {} values, expected {expected}",
                    local.len()
                ),
            });
        }
        let mut w = PacketWriter::with_capacity(local.len() * T::DTYPE.bytes());
        w.put_reals(local);
        let Some(packets) = gather(transport, ROOT, w.finish())? else {
            return Ok(());
        };
        let mut global: Vec<T> = Vec::with_capacity(layout.global_len());
        for (slab, packet) in layout.slabs().zip(&packets) {
            let mut r = PacketReader::new(packet);
            r.get_reals_into(slab.planes * layout.plane_len(), &mut global)?;
            r.finish()?;
        }
        self.write_global(store, iter, layout, &global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use slabtrace_comm::LocalCluster;
    use slabtrace_field::GridShape;
    use slabtrace_particles::PartitionClassifier;

    fn sample_state() -> ParticleState<f64> {
        let ids = vec![ParticleId(9), ParticleId(2), ParticleId(5)];
        let positions = vec![[0.1, 0.2, 0.3], [1.1, 1.2, 1.3], [2.1, 2.2, 2.3]];
        let slots = vec![
            vec![[9.0, 9.5, 9.25], [2.0, 2.5, 2.25], [5.0, 5.5, 5.25]],
            vec![[-9.0; 3], [-2.0; 3], [-5.0; 3]],
        ];
        ParticleState::from_parts(ids, positions, slots).unwrap()
    }

    #[test]
    fn names_follow_species_layout() {
        let ck = ParticleCheckpoint::new("tracers").unwrap();
        assert_eq!(ck.state_name(40), "tracers/state/40");
        assert_eq!(ck.index_name(40), "tracers/index/40");
        assert_eq!(ck.rhs_name(40, 3), "tracers/rhs/40/3");
        assert!(ParticleCheckpoint::new("bad name").is_err());
        assert_eq!(FieldSnapshot::new("u").unwrap().dataset_name(7), "u/7");
    }

    #[test]
    fn checkpoint_is_sorted_by_id_and_bit_identical() {
        let ck = ParticleCheckpoint::new("tracers").unwrap();
        let mut store = MemoryStore::new();
        let state = sample_state();
        ck.write(&mut store, 3, &state).unwrap();
        assert_eq!(get_u64s(&store, "tracers/index/3").unwrap(), vec![2, 5, 9]);

        let back: ParticleState<f64> = ck.read(&store, 3, 2).unwrap();
        assert_eq!(back.ids(), &[ParticleId(2), ParticleId(5), ParticleId(9)]);
        for (p, id) in back.ids().iter().enumerate() {
            let q = state.ids().iter().position(|x| x == id).unwrap();
            assert_eq!(back.positions()[p], state.positions()[q]);
            for slot in 0..2 {
                assert_eq!(back.history().slot(slot)[p], state.history().slot(slot)[q]);
            }
        }
    }

    #[test]
    fn missing_history_slot_is_not_found() {
        let ck = ParticleCheckpoint::new("tracers").unwrap();
        let mut store = MemoryStore::new();
        ck.write(&mut store, 0, &sample_state()).unwrap();
        assert!(matches!(
            ck.read::<_, f64>(&store, 0, 3),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn inconsistent_datasets_are_rejected() {
        let ck = ParticleCheckpoint::new("tracers").unwrap();
        let mut store = MemoryStore::new();
        ck.write(&mut store, 0, &sample_state()).unwrap();
        put_reals(&mut store, "tracers/state/0", &[0.0f64; 4]).unwrap();
        assert!(matches!(
            ck.read::<_, f64>(&store, 0, 2),
            Err(StoreError::MalformedDataset { .. })
        ));
        put_u64s(&mut store, "tracers/index/0", &[1, 1, 2]).unwrap();
        put_reals(&mut store, "tracers/state/0", &[0.0f64; 9]).unwrap();
        assert!(matches!(
            ck.read::<_, f64>(&store, 0, 0),
            Err(StoreError::Step(_))
        ));
    }

    #[test]
    fn read_owned_keeps_local_particles() {
        let ck = ParticleCheckpoint::new("tracers").unwrap();
        let mut store = MemoryStore::new();
        ck.write(&mut store, 1, &sample_state()).unwrap();

        let layout = SlabLayout::even(GridShape::new(2, 2, 4), 3, 2).unwrap();
        let c = PartitionClassifier::new(0.0, 4.0, 4).unwrap();
        let lower = Redistributor::new(c, &layout, Rank(0)).unwrap();
        let upper = Redistributor::new(c, &layout, Rank(1)).unwrap();
        let a: ParticleState<f64> = ck.read_owned(&store, 1, 2, &lower).unwrap();
        let b: ParticleState<f64> = ck.read_owned(&store, 1, 2, &upper).unwrap();
        assert_eq!(a.ids(), &[ParticleId(2), ParticleId(9)]);
        assert_eq!(b.ids(), &[ParticleId(5)]);
    }

    #[test]
    fn single_rank_save_writes_everything() {
        let ck = ParticleCheckpoint::new("tracers").unwrap();
        let mut store = MemoryStore::new();
        let mut t = LocalCluster::endpoints(1).remove(0);
        ck.save(&mut store, 4, &sample_state(), &mut t).unwrap();
        let back: ParticleState<f64> = ck.read(&store, 4, 2).unwrap();
        assert_eq!(back.len(), 3);
    }

    #[test]
    fn field_snapshot_slices_per_rank() {
        let layout = SlabLayout::even(GridShape::new(2, 1, 3), 1, 2).unwrap();
        let snap = FieldSnapshot::new("u").unwrap();
        let mut store = MemoryStore::new();
        let global: Vec<f32> = (0..6).map(|i| i as f32).collect();
        snap.write_global(&mut store, 0, &layout, &global).unwrap();
        assert_eq!(
            snap.read_local::<_, f32>(&store, 0, &layout, Rank(0)).unwrap(),
            vec![0.0, 1.0, 2.0, 3.0]
        );
        assert_eq!(
            snap.read_local::<_, f32>(&store, 0, &layout, Rank(1)).unwrap(),
            vec![4.0, 5.0]
        );
        assert_eq!(snap.read_global::<_, f32>(&store, 0, &layout).unwrap(), global);
        assert!(snap.write_global(&mut store, 1, &layout, &global[..5]).is_err());
    }
}
