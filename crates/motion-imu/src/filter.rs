use crate::types::RawSample;
use std::collections::VecDeque;

/// Number of samples the smoothing window spans.
pub const WINDOW: usize = 3;

/// Tap weights, oldest sample first.
const WEIGHTS: [f32; WINDOW] = [0.5, 0.3, 0.2];

/// Fixed-weight 3-tap FIR smoother over raw samples.
///
/// History is kept whether or not smoothing is enabled, so toggling it on
/// takes effect on the very next sample.
pub struct TemporalFilter {
    history: VecDeque<RawSample>,
    enabled: bool,
}

impl TemporalFilter {
    pub fn new(enabled: bool) -> Self {
        Self {
            history: VecDeque::with_capacity(WINDOW),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Number of buffered samples (at most [`WINDOW`]).
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Record a sample and return the smoothed reading.
    ///
    /// Passes the sample through unchanged while disabled or until the window is full.
    /// Timestamp and temperature always come from the newest sample.
    pub fn push(&mut self, sample: RawSample) -> RawSample {
        if self.history.len() == WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(sample.clone());

        if !self.enabled || self.history.len() < WINDOW {
            return sample;
        }

        let (accel, gyro) = self
            .history
            .iter()
            .zip(WEIGHTS)
            .fold((glam::Vec3::ZERO, glam::Vec3::ZERO), |(a, g), (s, w)| {
                (a + s.accel * w, g + s.gyro * w)
            });

        RawSample {
            accel,
            gyro,
            timestamp: sample.timestamp,
            temperature: sample.temperature,
        }
    }
}
