//! Per-axis interpolation weights.

use slabtrace_core::FieldError;

/// Largest supported stencil half-width.
pub const MAX_HALF_WIDTH: usize = 6;

/// Source of one-dimensional stencil weights.
///
/// A basis of half-width `N` produces `2N + 2` weights for the nodes
/// `-N..=N+1` relative to the cell index, given the fractional offset of
/// the query inside the cell (`0 <= offset < 1`). Derivative weights are
/// per grid spacing.
///
/// Implementations must be deterministic: every rank evaluating the same
/// `(derivative, offset)` must get bit-identical weights.
pub trait BasisWeights: Send + Sync {
    /// Stencil half-width `N`.
    fn half_width(&self) -> usize;

    /// Highest derivative order [`weights`](BasisWeights::weights) accepts.
    fn max_derivative(&self) -> u8;

    /// Number of weights per axis, `2N + 2`.
    fn stencil_len(&self) -> usize {
        2 * self.half_width() + 2
    }

    /// Write the weights for `derivative` at `offset` into `out`.
    ///
    /// Callers guarantee `derivative <= max_derivative()` and
    /// `out.len() == stencil_len()`. For derivative 0 the weights sum to 1.
    fn weights(&self, derivative: u8, offset: f64, out: &mut [f64]);
}

/// Lagrange interpolation on the equispaced nodes `-N..=N+1`.
///
/// Exact at grid points: at `offset == 0` the node-0 weight is exactly 1
/// and every other weight is exactly 0. Supports derivative orders 0
/// and 1.
#[derive(Clone, Debug)]
pub struct LagrangeBasis {
    half_width: usize,
    nodes: Vec<f64>,
    /// `Π_{m≠j} (x_j - x_m)` for every node `j`.
    denominators: Vec<f64>,
}

impl LagrangeBasis {
    /// Basis of half-width `half_width` (1..=[`MAX_HALF_WIDTH`]).
    pub fn new(half_width: usize) -> Result<Self, FieldError> {
        if half_width == 0 || half_width > MAX_HALF_WIDTH {
            return Err(FieldError::UnsupportedHalfWidth {
                half_width,
                max: MAX_HALF_WIDTH,
            });
        }
        let n = half_width as i64;
        let nodes: Vec<f64> = (-n..=n + 1).map(|x| x as f64).collect();
        let denominators: Vec<f64> = nodes
            .iter()
            .enumerate()
            .map(|(j, &xj)| {
                nodes
                    .iter()
                    .enumerate()
                    .filter(|&(m, _)| m != j)
                    .map(|(_, &xm)| xj - xm)
                    .product::<f64>()
            })
            .collect();
        Ok(Self {
            half_width,
            nodes,
            denominators,
        })
    }

    fn value_weights(&self, x: f64, out: &mut [f64]) {
        for (j, w) in out.iter_mut().enumerate() {
            let num: f64 = self
                .nodes
                .iter()
                .enumerate()
                .filter(|&(m, _)| m != j)
                .map(|(_, &xm)| x - xm)
                .product();
            *w = num / self.denominators[j];
        }
    }

    fn slope_weights(&self, x: f64, out: &mut [f64]) {
        for (j, w) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for k in (0..self.nodes.len()).filter(|&k| k != j) {
                let prod: f64 = self
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(|&(m, _)| m != j && m != k)
                    .map(|(_, &xm)| x - xm)
                    .product();
                sum += prod;
            }
            *w = sum / self.denominators[j];
        }
    }
}

impl BasisWeights for LagrangeBasis {
    fn half_width(&self) -> usize {
        self.half_width
    }

    fn max_derivative(&self) -> u8 {
        1
    }

    fn weights(&self, derivative: u8, offset: f64, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.stencil_len());
        match derivative {
            0 => self.value_weights(offset, out),
            _ => self.slope_weights(offset, out),
        }
    }
}
