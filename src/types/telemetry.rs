//! Telemetry snapshots and linear camera statistics.

use crate::error::FrameError;
use crate::protocol::{LINEAR_FRAME_LEN, PROXIMITY_FRAME_LEN};

/// Statistics derived from the linear camera intensities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntensityMetrics {
    /// Index of the first maximum, scanning from the left.
    pub left_peak_index: usize,
    /// Index of the first maximum, scanning from the right.
    pub right_peak_index: usize,
    /// Midpoint of the two peak indices, rounded down.
    pub peak_index: usize,
    /// Largest intensity.
    pub max: u8,
    /// Smallest intensity.
    pub min: u8,
    /// `max - min`.
    pub delta: u8,
    /// Mean intensity, truncated.
    pub average: u8,
}

impl IntensityMetrics {
    /// Computes the statistics of an intensity sequence.
    ///
    /// A plateau of equal maxima is reported by its midpoint. An empty
    /// sequence yields all zeros.
    #[must_use]
    pub fn compute(values: &[u8]) -> Self {
        let Some(&first) = values.first() else {
            return Self::default();
        };

        let mut max = first;
        let mut min = first;
        let mut left_peak_index = 0;
        let mut sum = 0usize;
        for (i, &value) in values.iter().enumerate() {
            if value > max {
                max = value;
                left_peak_index = i;
            }
            min = min.min(value);
            sum += usize::from(value);
        }
        let right_peak_index = values
            .iter()
            .rposition(|&value| value == max)
            .unwrap_or(left_peak_index);

        Self {
            left_peak_index,
            right_peak_index,
            peak_index: (left_peak_index + right_peak_index) / 2,
            max,
            min,
            delta: max - min,
            average: u8::try_from(sum / values.len()).unwrap_or(u8::MAX),
        }
    }
}

/// One decoded poll cycle.
///
/// Snapshots are published behind an `Arc` and never modified; every
/// cycle produces a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Poll cycle number, starting at 1.
    pub sequence: u64,
    /// Linear camera intensities, indexed by pixel position.
    pub intensities: [u8; LINEAR_FRAME_LEN],
    /// Infrared proximity readings.
    pub proximity: [u8; PROXIMITY_FRAME_LEN],
    /// Statistics over `intensities`.
    pub metrics: IntensityMetrics,
}

impl TelemetrySnapshot {
    /// Decodes the two response frames of a poll cycle.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Incomplete`] if either frame has the wrong length.
    pub fn decode(sequence: u64, linear: &[u8], proximity: &[u8]) -> Result<Self, FrameError> {
        let intensities: [u8; LINEAR_FRAME_LEN] =
            linear.try_into().map_err(|_| FrameError::Incomplete {
                expected: LINEAR_FRAME_LEN,
                got: linear.len(),
            })?;
        let proximity: [u8; PROXIMITY_FRAME_LEN] =
            proximity.try_into().map_err(|_| FrameError::Incomplete {
                expected: PROXIMITY_FRAME_LEN,
                got: proximity.len(),
            })?;

        Ok(Self {
            sequence,
            intensities,
            proximity,
            metrics: IntensityMetrics::compute(&intensities),
        })
    }
}
