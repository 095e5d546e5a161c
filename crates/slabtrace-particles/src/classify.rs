//! Slab-axis partition classification.

use slabtrace_core::StepError;

/// Maps a slab-axis coordinate to one of `partitions` equal-width
/// half-open intervals tiling `[low, low + length)`.
///
/// Partition `k` is `[bound(k), bound(k + 1))` with
/// `bound(k) = low + k * width`, evaluated the same way everywhere it is
/// used, so every rank agrees on which side of a boundary a value falls.
/// A value exactly on a boundary belongs to the upper partition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PartitionClassifier {
    low: f64,
    length: f64,
    partitions: usize,
    width: f64,
}

impl PartitionClassifier {
    /// Classifier for `partitions` intervals over `[low, low + length)`.
    pub fn new(low: f64, length: f64, partitions: usize) -> Result<Self, StepError> {
        if !low.is_finite() || !length.is_finite() || length <= 0.0 || partitions == 0 {
            return Err(StepError::PreconditionViolation {
                reason: format!(
                    "partition classifier needs finite low, positive length and at least one \
                     partition, got low = {low}, length = {length}, partitions = {partitions}"
                ),
            });
        }
        Ok(Self {
            low,
            length,
            partitions,
            width: length / partitions as f64,
        })
    }

    /// Number of partitions.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Width of one partition.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Lower edge of the covered range.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Length of the covered range.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Lower bound of partition `k` (`k == partitions` gives the upper end).
    pub fn bound(&self, k: usize) -> f64 {
        self.low + k as f64 * self.width
    }

    /// Map `z` into `[low, low + length)` periodically.
    pub fn wrap(&self, z: f64) -> f64 {
        let wrapped = self.low + (z - self.low).rem_euclid(self.length);
        if wrapped >= self.low + self.length {
            self.low
        } else {
            wrapped
        }
    }

    /// Partition containing `z`, which must already lie in
    /// `[low, low + length)`. `None` for non-finite input.
    pub fn classify(&self, z: f64) -> Option<usize> {
        if !z.is_finite() {
            return None;
        }
        let last = self.partitions - 1;
        let guess = ((z - self.low) / self.width).floor();
        let mut k = if guess <= 0.0 {
            0
        } else {
            (guess as usize).min(last)
        };
        // The quotient may round across a boundary; settle against bound().
        while k > 0 && z < self.bound(k) {
            k -= 1;
        }
        while k < last && z >= self.bound(k + 1) {
            k += 1;
        }
        Some(k)
    }
}
