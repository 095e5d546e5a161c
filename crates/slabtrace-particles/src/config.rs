//! Particle-system configuration, validation, and error types.

use std::error::Error;
use std::fmt;

use slabtrace_core::StepError;

use crate::integrator::MAX_ORDER;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`SystemConfig::validate()`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// A box side is NaN, infinite, zero, or negative.
    InvalidBoxSize {
        /// Axis index (0 = x, 1 = y, 2 = z).
        axis: usize,
        /// The invalid value.
        value: f64,
    },
    /// Integration order outside `1..=MAX_ORDER`.
    InvalidOrder {
        /// The configured order.
        order: usize,
    },
    /// Time fraction outside `[0, 1]` or non-finite.
    InvalidTimeFraction {
        /// The invalid value.
        value: f64,
    },
    /// Displacement guard is NaN, infinite, zero, or negative.
    InvalidDisplacementLimit {
        /// The invalid value.
        value: f64,
    },
    /// Time step is NaN or infinite.
    InvalidTimeStep {
        /// The invalid value.
        value: f64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBoxSize { axis, value } => {
                write!(f, "box size along axis {axis} must be finite and positive, got {value}")
            }
            Self::InvalidOrder { order } => {
                write!(f, "integration order {order} outside 1..={MAX_ORDER}")
            }
            Self::InvalidTimeFraction { value } => {
                write!(f, "time_fraction must lie in [0, 1], got {value}")
            }
            Self::InvalidDisplacementLimit { value } => {
                write!(
                    f,
                    "max_displacement_partitions must be finite and positive, got {value}"
                )
            }
            Self::InvalidTimeStep { value } => write!(f, "dt must be finite, got {value}"),
        }
    }
}

impl Error for ConfigError {}

impl From<ConfigError> for StepError {
    fn from(e: ConfigError) -> Self {
        StepError::PreconditionViolation {
            reason: e.to_string(),
        }
    }
}

// ── SystemConfig ───────────────────────────────────────────────────

/// Configuration for a [`SlabParticleSystem`](crate::system::SlabParticleSystem).
#[derive(Clone, Debug, PartialEq)]
pub struct SystemConfig {
    /// Physical box size `[Lx, Ly, Lz]`. Default: `[2π, 2π, 2π]`.
    pub box_size: [f64; 3],
    /// Adams-Bashforth order, also the history depth. Default: 4.
    pub integration_order: usize,
    /// Integration time step. Default: 0.01.
    pub dt: f64,
    /// Generation blend used when computing velocities. Default: 1.0
    /// (the newest generation).
    pub time_fraction: f64,
    /// Largest slab-axis displacement per step, in partition widths.
    /// `None` disables the guard. Default: `None`.
    pub max_displacement_partitions: Option<f64>,
    /// Verify the global particle count after every redistribution.
    /// Default: true.
    pub check_conservation: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let tau = 2.0 * std::f64::consts::PI;
        Self {
            box_size: [tau, tau, tau],
            integration_order: 4,
            dt: 0.01,
            time_fraction: 1.0,
            max_displacement_partitions: None,
            check_conservation: true,
        }
    }
}

impl SystemConfig {
    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, &value) in self.box_size.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidBoxSize { axis, value });
            }
        }
        if self.integration_order == 0 || self.integration_order > MAX_ORDER {
            return Err(ConfigError::InvalidOrder {
                order: self.integration_order,
            });
        }
        if !self.dt.is_finite() {
            return Err(ConfigError::InvalidTimeStep { value: self.dt });
        }
        if !(0.0..=1.0).contains(&self.time_fraction) {
            return Err(ConfigError::InvalidTimeFraction {
                value: self.time_fraction,
            });
        }
        if let Some(value) = self.max_displacement_partitions {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidDisplacementLimit { value });
            }
        }
        Ok(())
    }
}
