//! Step orchestration: compute, move, redistribute, advance, rotate.
//!
//! [`ParticleSystem`] is the per-rank interface; [`SlabParticleSystem`]
//! is the implementation over a slab-decomposed field, with precision,
//! basis, and transport fixed by its type parameters.
//!
//! # Lifecycle
//!
//! ```text
//! Ready ──complete_loop──▶ Stepping ──ok──▶ Ready
//!   │                         │
//!   └────── fatal error ──────┴──────────▶ Shutdown (terminal)
//! ```
//!
//! Every error raised by a step phase is fatal: the system logs it,
//! drops its particle, field, and transport state, and refuses further
//! work with [`StepError::ShutDown`]. Dropping the transport unblocks
//! peers waiting on this rank with a disconnect error.

use std::fmt;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use slabtrace_comm::{all_reduce_sum, Transport};
use slabtrace_core::{Real, StepError, StepIndex};
use slabtrace_field::{BasisWeights, GridPoint, HaloInterpolator, SlabLayout};

use crate::classify::PartitionClassifier;
use crate::config::{ConfigError, SystemConfig};
use crate::integrator::AdamsBashforth;
use crate::metrics::StepReport;
use crate::redistribute::{ExchangeStats, PartitionTable, Redistributor};
use crate::state::ParticleState;

/// Orchestrator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemState {
    /// Idle between steps.
    Ready,
    /// Inside [`complete_loop`](ParticleSystem::complete_loop).
    Stepping,
    /// Terminal; all buffers released.
    Shutdown,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Stepping => write!(f, "stepping"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// One rank's share of a particle population advected through a field.
///
/// The phase methods are collective where noted: every rank must call
/// them in the same order.
pub trait ParticleSystem {
    /// Particle precision.
    type Real: Real;

    /// Current lifecycle state.
    fn state(&self) -> SystemState;

    /// Index of the step about to run (starts at 1).
    fn step_index(&self) -> StepIndex;

    /// Particles held by this rank (0 after shutdown).
    fn local_count(&self) -> usize;

    /// History slots per particle, equal to the maximum integration order.
    fn history_depth(&self) -> usize;

    /// Local particles, or `None` after shutdown.
    fn particles(&self) -> Option<&ParticleState<Self::Real>>;

    /// Evaluate the field at every local particle into history slot 0.
    fn compute_rhs(&mut self) -> Result<(), StepError>;

    /// Advance positions with Adams-Bashforth at the current step's order.
    fn move_particles(&mut self) -> Result<(), StepError>;

    /// Re-home particles to their owning ranks. Collective.
    fn redistribute(&mut self) -> Result<ExchangeStats, StepError>;

    /// Advance the step counter.
    fn inc_step(&mut self) -> Result<(), StepError>;

    /// Age the history by one slot and zero slot 0.
    fn shift_rhs(&mut self) -> Result<(), StepError>;

    /// Run one full step: compute, move, redistribute, advance, rotate.
    /// Collective.
    fn complete_loop(&mut self) -> Result<StepReport, StepError>;

    /// Release all buffers and enter [`SystemState::Shutdown`].
    fn shutdown(&mut self);
}

/// Buffers owned while the system is alive.
struct Live<R, T, B, C> {
    particles: ParticleState<R>,
    interpolator: HaloInterpolator<T, B>,
    table: PartitionTable,
    transport: C,
}

/// [`ParticleSystem`] over a slab-decomposed field.
///
/// - `R`: particle precision.
/// - `T`: field sample precision.
/// - `B`: interpolation basis (its half-width fixes the stencil).
/// - `C`: transport endpoint for this rank.
pub struct SlabParticleSystem<R, T, B, C> {
    config: SystemConfig,
    integrator: AdamsBashforth,
    redistributor: Redistributor,
    spacing: [f64; 3],
    step: StepIndex,
    status: SystemState,
    /// Set by a move, cleared by the following redistribution.
    moved: bool,
    global_count: u64,
    live: Option<Live<R, T, B, C>>,
}

impl<R, T, B, C> SlabParticleSystem<R, T, B, C>
where
    R: Real,
    T: Real,
    B: BasisWeights,
    C: Transport,
{
    /// Build the system for `transport.rank()`. Collective.
    ///
    /// `initial_field` is this rank's slab of a 3-component velocity
    /// field; `particles` may hold any particles, and are routed to their
    /// owners before this returns. Their history depth must equal
    /// `config.integration_order`.
    #[instrument(skip_all, name = "particle_system_new", fields(rank = transport.rank().0))]
    pub fn new(
        config: SystemConfig,
        layout: SlabLayout,
        basis: B,
        initial_field: &[T],
        mut particles: ParticleState<R>,
        mut transport: C,
    ) -> Result<Self, StepError> {
        config.validate()?;
        let integrator = AdamsBashforth::new(config.integration_order)?;
        if layout.components() != 3 {
            return Err(StepError::PreconditionViolation {
                reason: format!(
                    "velocity field needs 3 components, layout has {}",
                    layout.components()
                ),
            });
        }
        if particles.history().depth() != integrator.order() {
            return Err(StepError::PreconditionViolation {
                reason: format!(
                    "particles carry {} history slots, order {} needs {}",
                    particles.history().depth(),
                    integrator.order(),
                    integrator.order()
                ),
            });
        }
        let shape = layout.shape();
        let spacing = [
            config.box_size[0] / shape.nx as f64,
            config.box_size[1] / shape.ny as f64,
            config.box_size[2] / shape.nz as f64,
        ];
        let classifier = PartitionClassifier::new(0.0, config.box_size[2], shape.nz)?;
        let redistributor = Redistributor::new(classifier, &layout, transport.rank())?;
        let interpolator = HaloInterpolator::new(layout, basis, initial_field, &mut transport)?;

        let (table, _) = redistributor.redistribute(&mut particles, &mut transport, StepIndex(0))?;
        let global_count = all_reduce_sum(&mut transport, particles.len() as u64)?;
        debug!(local = particles.len(), global = global_count, "particle system ready");

        Ok(Self {
            config,
            integrator,
            redistributor,
            spacing,
            step: StepIndex::FIRST,
            status: SystemState::Ready,
            moved: false,
            global_count,
            live: Some(Live {
                particles,
                interpolator,
                table,
                transport,
            }),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Global particle count recorded at construction.
    pub fn global_count(&self) -> u64 {
        self.global_count
    }

    /// The redistributor, with the classifier and partition owners.
    pub fn redistributor(&self) -> &Redistributor {
        &self.redistributor
    }

    /// Partition table from the latest redistribution.
    pub fn partition_table(&self) -> Option<&PartitionTable> {
        self.live.as_ref().map(|l| &l.table)
    }

    /// The field interpolator.
    pub fn interpolator(&self) -> Option<&HaloInterpolator<T, B>> {
        self.live.as_ref().map(|l| &l.interpolator)
    }

    /// Choose the generation blend used by [`compute_rhs`](ParticleSystem::compute_rhs).
    pub fn set_time_fraction(&mut self, t: f64) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::InvalidTimeFraction { value: t });
        }
        self.config.time_fraction = t;
        Ok(())
    }

    /// Local particles together with the transport, for collectives run
    /// between steps (checkpoints). Every rank must take part in the same
    /// collectives in the same order.
    pub fn particles_and_transport(&mut self) -> Result<(&ParticleState<R>, &mut C), StepError> {
        let live = self.live.as_mut().ok_or(StepError::ShutDown)?;
        Ok((&live.particles, &mut live.transport))
    }

    /// Continue a restored run: the next step to execute is `step`.
    ///
    /// Only valid between steps. The step index
    /// fixes the effective integration order, so a run restored with its
    /// history resumes at the order it would have reached.
    pub fn resume_at(&mut self, step: StepIndex) -> Result<(), StepError> {
        if self.status != SystemState::Ready || self.moved {
            return Err(StepError::PreconditionViolation {
                reason: format!("cannot resume at step {step} while {}", self.status),
            });
        }
        if step < StepIndex::FIRST {
            return Err(StepError::PreconditionViolation {
                reason: "steps are numbered from 1".to_string(),
            });
        }
        self.step = step;
        Ok(())
    }

    /// Hand the interpolator a new field generation. Collective.
    pub fn refresh_field(&mut self, sample: &[T]) -> Result<(), StepError> {
        let result = match self.live.as_mut() {
            Some(live) => live
                .interpolator
                .refresh(sample, &mut live.transport)
                .map_err(StepError::from),
            None => Err(StepError::ShutDown),
        };
        self.fatal(result)
    }

    /// Shut down on any error other than an already-shut-down system.
    fn fatal<V>(&mut self, result: Result<V, StepError>) -> Result<V, StepError> {
        if let Err(e) = &result {
            if *e != StepError::ShutDown {
                warn!(error = %e, kind = %e.kind(), step = self.step.0, "fatal error, shutting down");
                self.shutdown();
            }
        }
        result
    }

    fn live_mut(&mut self) -> Result<&mut Live<R, T, B, C>, StepError> {
        self.live.as_mut().ok_or(StepError::ShutDown)
    }

    fn try_compute(&mut self) -> Result<(), StepError> {
        if self.moved {
            return Err(StepError::PreconditionViolation {
                reason: "compute_rhs after move needs a redistribution first".to_string(),
            });
        }
        let t = self.config.time_fraction;
        let spacing = self.spacing;
        let [lx, ly, _] = self.config.box_size;
        let classifier = *self.redistributor.classifier();
        let live = self.live.as_mut().ok_or(StepError::ShutDown)?;
        let (positions, history) = live.particles.positions_and_history_mut();
        let newest = history.slot_mut(0);
        let width = classifier.width();
        let mut v = [0.0f64; 3];
        for (k, range) in live.table.iter() {
            let base = classifier.bound(k);
            for p in range {
                let pos = positions[p];
                let x = pos[0].widen().rem_euclid(lx);
                let y = pos[1].widen().rem_euclid(ly);
                let xy = GridPoint::locate([x, y, 0.0], spacing);
                let point = GridPoint {
                    index: [xy.index[0], xy.index[1], k as i64],
                    offset: [xy.offset[0], xy.offset[1], (pos[2].widen() - base) / width],
                };
                live.interpolator.evaluate(t, &point, [0, 0, 0], &mut v)?;
                newest[p] = [R::cast(v[0]), R::cast(v[1]), R::cast(v[2])];
            }
        }
        Ok(())
    }

    fn try_move(&mut self) -> Result<(), StepError> {
        let step = self.step;
        let dt = self.config.dt;
        let limit = self
            .config
            .max_displacement_partitions
            .map(|n| n * self.redistributor.classifier().width());
        let integrator = self.integrator;
        let live = self.live.as_mut().ok_or(StepError::ShutDown)?;
        let before: Vec<f64> = match limit {
            Some(_) => live.particles.positions().iter().map(|p| p[2].widen()).collect(),
            None => Vec::new(),
        };
        let (positions, history) = live.particles.positions_and_history_mut();
        integrator.advance(step, dt, positions, history);
        self.moved = true;

        let particles = &live.particles;
        for (p, pos) in particles.positions().iter().enumerate() {
            if !pos.iter().all(|c| c.is_finite()) {
                return Err(StepError::NonFinitePosition {
                    id: particles.ids()[p],
                    step,
                });
            }
            if let Some(limit) = limit {
                let displacement = (pos[2].widen() - before[p]).abs();
                if displacement > limit {
                    return Err(StepError::DisplacementExceeded {
                        id: particles.ids()[p],
                        displacement,
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    fn try_redistribute(&mut self) -> Result<ExchangeStats, StepError> {
        let step = self.step;
        let check = self.config.check_conservation;
        let expected = self.global_count;
        let Self {
            redistributor,
            live,
            moved,
            ..
        } = self;
        let live = live.as_mut().ok_or(StepError::ShutDown)?;
        let (table, stats) =
            redistributor.redistribute(&mut live.particles, &mut live.transport, step)?;
        live.table = table;
        *moved = false;
        if check {
            let found = all_reduce_sum(&mut live.transport, live.particles.len() as u64)?;
            if found != expected {
                return Err(StepError::DataInconsistency { expected, found });
            }
        }
        Ok(stats)
    }
}

impl<R, T, B, C> ParticleSystem for SlabParticleSystem<R, T, B, C>
where
    R: Real,
    T: Real,
    B: BasisWeights,
    C: Transport,
{
    type Real = R;

    fn state(&self) -> SystemState {
        self.status
    }

    fn step_index(&self) -> StepIndex {
        self.step
    }

    fn local_count(&self) -> usize {
        self.live.as_ref().map_or(0, |l| l.particles.len())
    }

    fn history_depth(&self) -> usize {
        self.integrator.order()
    }

    fn particles(&self) -> Option<&ParticleState<R>> {
        self.live.as_ref().map(|l| &l.particles)
    }

    fn compute_rhs(&mut self) -> Result<(), StepError> {
        let result = self.try_compute();
        self.fatal(result)
    }

    fn move_particles(&mut self) -> Result<(), StepError> {
        let result = self.try_move();
        self.fatal(result)
    }

    fn redistribute(&mut self) -> Result<ExchangeStats, StepError> {
        let result = self.try_redistribute();
        self.fatal(result)
    }

    fn inc_step(&mut self) -> Result<(), StepError> {
        self.live_mut()?;
        self.step = self.step.next();
        Ok(())
    }

    fn shift_rhs(&mut self) -> Result<(), StepError> {
        self.live_mut()?.particles.history_mut().shift();
        Ok(())
    }

    #[instrument(skip_all, name = "complete_loop", fields(step = self.step.0))]
    fn complete_loop(&mut self) -> Result<StepReport, StepError> {
        match self.status {
            SystemState::Ready => {}
            SystemState::Shutdown => return Err(StepError::ShutDown),
            SystemState::Stepping => {
                return Err(StepError::PreconditionViolation {
                    reason: "complete_loop re-entered".to_string(),
                })
            }
        }
        self.status = SystemState::Stepping;
        let step = self.step;
        let order = self.integrator.effective_order(step);
        let start = Instant::now();

        self.compute_rhs()?;
        let computed = Instant::now();
        self.move_particles()?;
        let moved = Instant::now();
        let stats = self.redistribute()?;
        let redistributed = Instant::now();
        self.inc_step()?;
        self.shift_rhs()?;

        self.status = SystemState::Ready;
        let report = StepReport {
            step,
            order,
            local_count: self.local_count(),
            sent: stats.sent,
            received: stats.received,
            compute_us: (computed - start).as_micros() as u64,
            move_us: (moved - computed).as_micros() as u64,
            redistribute_us: (redistributed - moved).as_micros() as u64,
            total_us: start.elapsed().as_micros() as u64,
        };
        debug!(
            order,
            local = report.local_count,
            sent = report.sent,
            received = report.received,
            total_us = report.total_us,
            "step complete"
        );
        Ok(report)
    }

    fn shutdown(&mut self) {
        if self.live.take().is_some() {
            debug!(step = self.step.0, "particle system shut down");
        }
        self.status = SystemState::Shutdown;
    }
}

impl<R, T, B, C> fmt::Debug for SlabParticleSystem<R, T, B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabParticleSystem")
            .field("step", &self.step)
            .field("status", &self.status)
            .field("global_count", &self.global_count)
            .field("local_count", &self.live.as_ref().map(|l| l.particles.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slabtrace_comm::{ChannelTransport, LocalCluster};
    use slabtrace_core::ParticleId;
    use slabtrace_field::{GridShape, LagrangeBasis};

    type System = SlabParticleSystem<f64, f64, LagrangeBasis, ChannelTransport>;

    fn uniform_field(layout: &SlabLayout, v: [f64; 3]) -> Vec<f64> {
        (0..layout.global_len()).map(|i| v[i % 3]).collect()
    }

    fn single_rank(order: usize, v: [f64; 3], positions: Vec<[f64; 3]>) -> System {
        let layout = SlabLayout::even(GridShape::new(4, 4, 8), 3, 1).unwrap();
        let field = uniform_field(&layout, v);
        let config = SystemConfig {
            box_size: [4.0, 4.0, 8.0],
            integration_order: order,
            dt: 0.5,
            ..SystemConfig::default()
        };
        let ids = (0..positions.len() as u64).map(ParticleId).collect();
        let particles = ParticleState::with_positions(ids, positions, order).unwrap();
        let transport = LocalCluster::endpoints(1).remove(0);
        SlabParticleSystem::new(
            config,
            layout,
            LagrangeBasis::new(1).unwrap(),
            &field,
            particles,
            transport,
        )
        .unwrap()
    }

    #[test]
    fn loop_advances_step_and_rotates_history() {
        let mut sys = single_rank(3, [0.0, 0.0, 1.0], vec![[1.0, 1.0, 1.0]]);
        assert_eq!(sys.state(), SystemState::Ready);
        assert_eq!(sys.step_index(), StepIndex(1));
        let report = sys.complete_loop().unwrap();
        assert_eq!(report.step, StepIndex(1));
        assert_eq!(report.order, 1);
        assert_eq!(sys.step_index(), StepIndex(2));
        let p = sys.particles().unwrap();
        assert!((p.positions()[0][2] - 1.5).abs() < 1e-12);
        assert_eq!(p.history().slot(0)[0], [0.0; 3]);
        assert!((p.history().slot(1)[0][2] - 1.0).abs() < 1e-12);
        assert_eq!(sys.complete_loop().unwrap().order, 2);
        assert_eq!(sys.complete_loop().unwrap().order, 3);
        assert_eq!(sys.complete_loop().unwrap().order, 3);
    }

    #[test]
    fn constant_velocity_wraps_slab_axis() {
        let mut sys = single_rank(1, [0.0, 0.0, 4.0], vec![[0.5, 0.5, 7.5]]);
        sys.complete_loop().unwrap();
        let z = sys.particles().unwrap().positions()[0][2];
        assert!((z - 1.5).abs() < 1e-12, "z = {z}");
    }

    #[test]
    fn far_xy_positions_sample_the_periodic_field() {
        let positions = vec![[1e19, -1e19, 1.0], [-6.5, 9.25, 3.0]];
        let mut sys = single_rank(1, [0.0, 0.0, 2.0], positions);
        sys.complete_loop().unwrap();
        let p = sys.particles().unwrap();
        let mut by_id: Vec<_> = p.ids().iter().zip(p.positions()).collect();
        by_id.sort_unstable_by_key(|(id, _)| **id);
        let expected = [[1e19, -1e19, 2.0], [-6.5, 9.25, 4.0]];
        for ((_, got), want) in by_id.iter().zip(expected) {
            assert_eq!(got[..2], want[..2]);
            assert!((got[2] - want[2]).abs() < 1e-12, "z = {}", got[2]);
        }
    }

    #[test]
    fn compute_after_move_needs_redistribution() {
        let mut sys = single_rank(1, [0.0; 3], vec![[0.0; 3]]);
        sys.compute_rhs().unwrap();
        sys.move_particles().unwrap();
        assert!(matches!(
            sys.compute_rhs(),
            Err(StepError::PreconditionViolation { .. })
        ));
        assert_eq!(sys.state(), SystemState::Shutdown);
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut sys = single_rank(2, [0.0; 3], vec![[0.0; 3], [1.0; 3]]);
        assert_eq!(sys.local_count(), 2);
        sys.shutdown();
        assert_eq!(sys.state(), SystemState::Shutdown);
        assert_eq!(sys.local_count(), 0);
        assert!(sys.particles().is_none());
        assert!(sys.interpolator().is_none());
        assert_eq!(sys.complete_loop().err(), Some(StepError::ShutDown));
        assert_eq!(sys.compute_rhs().err(), Some(StepError::ShutDown));
        assert_eq!(sys.refresh_field(&[]).err(), Some(StepError::ShutDown));
    }

    #[test]
    fn displacement_guard_shuts_down() {
        let layout = SlabLayout::even(GridShape::new(4, 4, 8), 3, 1).unwrap();
        let field = uniform_field(&layout, [0.0, 0.0, 10.0]);
        let config = SystemConfig {
            box_size: [4.0, 4.0, 8.0],
            integration_order: 1,
            dt: 0.5,
            max_displacement_partitions: Some(2.0),
            ..SystemConfig::default()
        };
        let particles =
            ParticleState::with_positions(vec![ParticleId(9)], vec![[0.0, 0.0, 0.5]], 1).unwrap();
        let mut sys: System = SlabParticleSystem::new(
            config,
            layout,
            LagrangeBasis::new(1).unwrap(),
            &field,
            particles,
            LocalCluster::endpoints(1).remove(0),
        )
        .unwrap();
        match sys.complete_loop() {
            Err(StepError::DisplacementExceeded { id, limit, .. }) => {
                assert_eq!(id, ParticleId(9));
                assert_eq!(limit, 2.0);
            }
            other => panic!("expected DisplacementExceeded, got {other:?}"),
        }
        assert_eq!(sys.state(), SystemState::Shutdown);
    }

    #[test]
    fn construction_rejects_wrong_history_depth() {
        let layout = SlabLayout::even(GridShape::new(4, 4, 8), 3, 1).unwrap();
        let field = uniform_field(&layout, [0.0; 3]);
        let particles = ParticleState::<f64>::empty(2);
        let result: Result<System, _> = SlabParticleSystem::new(
            SystemConfig::default(),
            layout,
            LagrangeBasis::new(1).unwrap(),
            &field,
            particles,
            LocalCluster::endpoints(1).remove(0),
        );
        assert!(matches!(
            result,
            Err(StepError::PreconditionViolation { .. })
        ));
    }

    #[test]
    fn time_fraction_is_validated() {
        let mut sys = single_rank(1, [0.0; 3], vec![]);
        assert!(sys.set_time_fraction(0.25).is_ok());
        assert_eq!(sys.config().time_fraction, 0.25);
        assert!(sys.set_time_fraction(1.5).is_err());
        assert_eq!(sys.state(), SystemState::Ready);
    }

    #[test]
    fn resume_sets_effective_order() {
        let mut sys = single_rank(4, [0.0; 3], vec![[1.0, 1.0, 1.0]]);
        assert!(sys.resume_at(StepIndex(0)).is_err());
        sys.resume_at(StepIndex(3)).unwrap();
        assert_eq!(sys.complete_loop().unwrap().order, 3);
        assert_eq!(sys.step_index(), StepIndex(4));
        sys.move_particles().unwrap();
        assert!(sys.resume_at(StepIndex(1)).is_err());
    }
}
