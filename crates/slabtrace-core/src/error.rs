//! Error types for slabtrace.
//!
//! Organised by subsystem: transport ([`CommError`]), field layout and
//! interpolation ([`FieldError`]), and particle stepping ([`StepError`]).
//! Every variant is fatal to the run; [`ErrorKind`] classifies them for
//! diagnostics. Nothing here is retried, because a retry on one rank
//! would break the lockstep ordering every other rank depends on.

use std::error::Error;
use std::fmt;

use crate::id::{ParticleId, Rank, StepIndex};

/// Coarse classification of a fatal error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller or configuration broke a documented precondition.
    PreconditionViolation,
    /// The transport failed during an exchange.
    CommunicationFailure,
    /// A global invariant was found broken after a protocol phase.
    DataInconsistency,
    /// A non-finite value appeared in particle state.
    Numerical,
    /// The system has already been shut down.
    ShutDown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreconditionViolation => write!(f, "precondition violation"),
            Self::CommunicationFailure => write!(f, "communication failure"),
            Self::DataInconsistency => write!(f, "data inconsistency"),
            Self::Numerical => write!(f, "numerical error"),
            Self::ShutDown => write!(f, "shut down"),
        }
    }
}

// ── CommError ──────────────────────────────────────────────────────

/// Errors from point-to-point transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommError {
    /// The peer endpoint was dropped before the exchange completed.
    Disconnected {
        /// The rank that could not be reached.
        peer: Rank,
    },
    /// A rank index outside `0..size` was addressed.
    UnknownRank {
        /// The offending rank.
        rank: Rank,
        /// Number of ranks in the group.
        size: usize,
    },
    /// An envelope named a different endpoint than the one handling it.
    Misaddressed {
        /// Rank of the endpoint handling the envelope.
        expected: Rank,
        /// Rank written in the envelope.
        found: Rank,
    },
    /// A packet could not be decoded.
    MalformedPacket {
        /// Human-readable description of what went wrong.
        detail: String,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer } => write!(f, "peer rank {peer} disconnected"),
            Self::UnknownRank { rank, size } => {
                write!(f, "rank {rank} is outside a group of {size} ranks")
            }
            Self::Misaddressed { expected, found } => {
                write!(f, "envelope addressed to rank {found}, handled by rank {expected}")
            }
            Self::MalformedPacket { detail } => write!(f, "malformed packet: {detail}"),
        }
    }
}

impl Error for CommError {}

// ── FieldError ─────────────────────────────────────────────────────

/// Errors from slab layouts and the halo-buffered interpolator.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldError {
    /// The slab layout description is inconsistent.
    InvalidLayout {
        /// Description of the inconsistency.
        reason: String,
    },
    /// A non-slab axis is not periodic; the interpolator wraps both.
    NonPeriodicAxis {
        /// Name of the offending axis.
        axis: &'static str,
    },
    /// The stencil half-width is outside the supported range.
    UnsupportedHalfWidth {
        /// Requested half-width.
        half_width: usize,
        /// Largest supported half-width.
        max: usize,
    },
    /// A slab has fewer planes than the halo needs from it.
    SlabTooThin {
        /// Rank owning the slab.
        rank: Rank,
        /// Planes in the slab.
        planes: usize,
        /// Halo width in planes.
        halo: usize,
    },
    /// A refresh sample does not match the local slab size.
    SampleSizeMismatch {
        /// Expected number of samples.
        expected: usize,
        /// Number supplied.
        found: usize,
    },
    /// A halo exchange delivered a buffer of the wrong size.
    HaloSizeMismatch {
        /// Rank that sent the buffer.
        from: Rank,
        /// Expected number of samples.
        expected: usize,
        /// Number received.
        found: usize,
    },
    /// A stencil on the slab axis reaches outside the halo-padded buffer.
    OutsideHalo {
        /// Local slab-axis index of the query (relative to the slab start).
        local_plane: i64,
        /// Number of planes in the local slab.
        planes: usize,
    },
    /// A time fraction outside `[0, 1]` or non-finite.
    InvalidTimeFraction {
        /// The offending value.
        value: f64,
    },
    /// The basis cannot produce weights for the requested derivative order.
    UnsupportedDerivative {
        /// Requested order.
        order: u8,
        /// Highest order the basis supports.
        max: u8,
    },
    /// The output slice does not match the component count.
    ComponentMismatch {
        /// Components in the field.
        expected: usize,
        /// Length of the output slice.
        found: usize,
    },
    /// Transport failure during a halo exchange.
    Comm(CommError),
}

impl FieldError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Comm(_) => ErrorKind::CommunicationFailure,
            _ => ErrorKind::PreconditionViolation,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLayout { reason } => write!(f, "invalid slab layout: {reason}"),
            Self::NonPeriodicAxis { axis } => {
                write!(f, "axis {axis} must be periodic for stencil wrap-around")
            }
            Self::UnsupportedHalfWidth { half_width, max } => {
                write!(f, "stencil half-width {half_width} outside 1..={max}")
            }
            Self::SlabTooThin { rank, planes, halo } => {
                write!(
                    f,
                    "slab of rank {rank} has {planes} planes, fewer than halo width {halo}"
                )
            }
            Self::SampleSizeMismatch { expected, found } => {
                write!(f, "field sample has {found} values, expected {expected}")
            }
            Self::HaloSizeMismatch {
                from,
                expected,
                found,
            } => {
                write!(
                    f,
                    "halo from rank {from} has {found} values, expected {expected}"
                )
            }
            Self::OutsideHalo {
                local_plane,
                planes,
            } => {
                write!(
                    f,
                    "stencil at local plane {local_plane} leaves the halo of a {planes}-plane slab"
                )
            }
            Self::InvalidTimeFraction { value } => {
                write!(f, "time fraction must lie in [0, 1], got {value}")
            }
            Self::UnsupportedDerivative { order, max } => {
                write!(f, "derivative order {order} exceeds basis maximum {max}")
            }
            Self::ComponentMismatch { expected, found } => {
                write!(f, "output has {found} components, field has {expected}")
            }
            Self::Comm(e) => write!(f, "halo exchange: {e}"),
        }
    }
}

impl Error for FieldError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Comm(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommError> for FieldError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

// ── StepError ──────────────────────────────────────────────────────

/// Errors from the particle system during ingestion or a step.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// A documented precondition was broken.
    PreconditionViolation {
        /// Description of the violated precondition.
        reason: String,
    },
    /// A particle moved further along the slab axis in one step than the
    /// configured displacement guard allows.
    DisplacementExceeded {
        /// The particle that moved too far.
        id: ParticleId,
        /// Absolute slab-axis displacement.
        displacement: f64,
        /// Configured limit.
        limit: f64,
    },
    /// A particle position became NaN or infinite.
    NonFinitePosition {
        /// The affected particle.
        id: ParticleId,
        /// Step during which the value appeared.
        step: StepIndex,
    },
    /// The global particle count changed across a redistribution.
    DataInconsistency {
        /// Count the run was seeded with.
        expected: u64,
        /// Count summed across ranks.
        found: u64,
    },
    /// The same particle id is held twice on one rank.
    DuplicateParticle {
        /// The duplicated id.
        id: ParticleId,
    },
    /// Field evaluation failed.
    Field(FieldError),
    /// Transport failure during redistribution.
    Comm(CommError),
    /// The system has been shut down and owns no buffers.
    ShutDown,
}

impl StepError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PreconditionViolation { .. } | Self::DisplacementExceeded { .. } => {
                ErrorKind::PreconditionViolation
            }
            Self::NonFinitePosition { .. } => ErrorKind::Numerical,
            Self::DataInconsistency { .. } | Self::DuplicateParticle { .. } => {
                ErrorKind::DataInconsistency
            }
            Self::Field(e) => e.kind(),
            Self::Comm(_) => ErrorKind::CommunicationFailure,
            Self::ShutDown => ErrorKind::ShutDown,
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreconditionViolation { reason } => {
                write!(f, "precondition violated: {reason}")
            }
            Self::DisplacementExceeded {
                id,
                displacement,
                limit,
            } => {
                write!(
                    f,
                    "particle {id} moved {displacement} along the slab axis, limit is {limit}"
                )
            }
            Self::NonFinitePosition { id, step } => {
                write!(f, "particle {id} has a non-finite position at step {step}")
            }
            Self::DataInconsistency { expected, found } => {
                write!(
                    f,
                    "global particle count is {found} after redistribution, expected {expected}"
                )
            }
            Self::DuplicateParticle { id } => write!(f, "particle {id} is held twice"),
            Self::Field(e) => write!(f, "field: {e}"),
            Self::Comm(e) => write!(f, "redistribution: {e}"),
            Self::ShutDown => write!(f, "particle system is shut down"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Field(e) => Some(e),
            Self::Comm(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FieldError> for StepError {
    fn from(e: FieldError) -> Self {
        Self::Field(e)
    }
}

impl From<CommError> for StepError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}
