//! Per-step report returned by [`complete_loop`](crate::ParticleSystem::complete_loop).

use slabtrace_core::StepIndex;

/// Timing and traffic for one completed step on one rank.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// The step that was completed.
    pub step: StepIndex,
    /// Integration order used for the move.
    pub order: usize,
    /// Particles held after redistribution.
    pub local_count: usize,
    /// Particles shipped to other ranks.
    pub sent: u64,
    /// Particles received from other ranks.
    pub received: u64,
    /// Time spent evaluating velocities.
    pub compute_us: u64,
    /// Time spent integrating positions.
    pub move_us: u64,
    /// Time spent redistributing, including the conservation check.
    pub redistribute_us: u64,
    /// Wall-clock time for the whole step.
    pub total_us: u64,
}
