//! Bounded-order Adams-Bashforth integration.
//!
//! The integrator is stateless apart from its maximum order `m`. The
//! order used at step `s` is `min(s, m)`, so the first step is forward
//! Euler and the scheme ramps up one order per step while the history
//! fills.

use slabtrace_core::{Real, StepIndex};

use crate::config::ConfigError;
use crate::state::RhsHistory;

/// Highest supported order.
pub const MAX_ORDER: usize = 6;

const AB1: [f64; 1] = [1.0];
const AB2: [f64; 2] = [3.0 / 2.0, -1.0 / 2.0];
const AB3: [f64; 3] = [23.0 / 12.0, -16.0 / 12.0, 5.0 / 12.0];
const AB4: [f64; 4] = [55.0 / 24.0, -59.0 / 24.0, 37.0 / 24.0, -9.0 / 24.0];
const AB5: [f64; 5] = [
    1901.0 / 720.0,
    -2774.0 / 720.0,
    2616.0 / 720.0,
    -1274.0 / 720.0,
    251.0 / 720.0,
];
const AB6: [f64; 6] = [
    4277.0 / 1440.0,
    -7923.0 / 1440.0,
    9982.0 / 1440.0,
    -7298.0 / 1440.0,
    2877.0 / 1440.0,
    -475.0 / 1440.0,
];

/// Adams-Bashforth stepper of maximum order `m`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdamsBashforth {
    order: usize,
}

impl AdamsBashforth {
    /// Stepper of maximum order `order` (1..=[`MAX_ORDER`]).
    pub fn new(order: usize) -> Result<Self, ConfigError> {
        if order == 0 || order > MAX_ORDER {
            return Err(ConfigError::InvalidOrder { order });
        }
        Ok(Self { order })
    }

    /// Maximum order, equal to the history depth it needs.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Order used at `step` (steps count from 1).
    pub fn effective_order(&self, step: StepIndex) -> usize {
        (step.0.max(1) as usize).min(self.order)
    }

    /// Coefficients for `order`, newest history slot first.
    ///
    /// # Panics
    ///
    /// If `order` is outside `1..=MAX_ORDER`.
    pub fn coefficients(order: usize) -> &'static [f64] {
        match order {
            1 => &AB1,
            2 => &AB2,
            3 => &AB3,
            4 => &AB4,
            5 => &AB5,
            6 => &AB6,
            _ => panic!("Adams-Bashforth order {order} outside 1..={MAX_ORDER}"),
        }
    }

    /// `positions[p] += dt * Σ c_i * history[i][p]` at the order for `step`.
    ///
    /// Sums are formed in `f64` and cast back once per coordinate.
    pub fn advance<R: Real>(
        &self,
        step: StepIndex,
        dt: f64,
        positions: &mut [[R; 3]],
        history: &RhsHistory<R>,
    ) {
        let coeffs = Self::coefficients(self.effective_order(step));
        debug_assert!(history.depth() >= coeffs.len());
        for (p, pos) in positions.iter_mut().enumerate() {
            let mut incr = [0.0f64; 3];
            for (slot, &c) in coeffs.iter().enumerate() {
                let rhs = history.slot(slot)[p];
                for axis in 0..3 {
                    incr[axis] += c * rhs[axis].widen();
                }
            }
            for axis in 0..3 {
                pos[axis] = R::cast(pos[axis].widen() + dt * incr[axis]);
            }
        }
    }
}
