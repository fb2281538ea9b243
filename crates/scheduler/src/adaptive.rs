use sessionconfig::AdaptiveSamplingSettings;

use crate::SchedulerError;

/// Convergence testing collaborator consulted by the scheduler.
///
/// Sample indices are absolute and 0-based.
pub trait AdaptiveSamplingPolicy: Send {
    fn is_enabled(&self) -> bool;

    /// Noise threshold forwarded to the filter pass.
    fn threshold(&self) -> f32 {
        0.0
    }

    /// Whether the adaptive filter is to be applied after the given sample.
    fn need_filter(&self, sample: u32) -> bool;

    /// Adjusts the number of samples of a batch starting at `start_sample` so
    /// that no filter sample is skipped.
    fn align_samples(&self, start_sample: u32, num_samples: u32) -> u32;
}

/// Filter checkpoints every `adaptive_step` samples once `min_samples` are
/// rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveSampling {
    enabled: bool,
    adaptive_step: u32,
    min_samples: u32,
    threshold: f32,
}

impl Default for AdaptiveSampling {
    fn default() -> Self {
        Self::disabled()
    }
}

impl AdaptiveSampling {
    pub fn new(adaptive_step: u32, min_samples: u32, threshold: f32) -> Result<Self, SchedulerError> {
        if !adaptive_step.is_power_of_two() {
            return Err(SchedulerError::InvalidAdaptiveStep(adaptive_step));
        }
        Ok(Self {
            enabled: true,
            adaptive_step,
            min_samples,
            threshold,
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            adaptive_step: 1,
            min_samples: 0,
            threshold: 0.0,
        }
    }

    pub fn from_settings(settings: &AdaptiveSamplingSettings) -> Result<Self, SchedulerError> {
        if !settings.enabled {
            return Ok(Self::disabled());
        }
        Self::new(
            settings.adaptive_step,
            settings.min_samples,
            settings.threshold,
        )
    }

    pub fn adaptive_step(&self) -> u32 {
        self.adaptive_step
    }

    pub fn min_samples(&self) -> u32 {
        self.min_samples
    }

    fn step_mask(&self) -> u32 {
        self.adaptive_step - 1
    }

    fn first_filter_sample(&self) -> u32 {
        self.min_samples.saturating_add(1) | self.step_mask()
    }
}

impl AdaptiveSamplingPolicy for AdaptiveSampling {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn threshold(&self) -> f32 {
        if self.enabled {
            self.threshold
        } else {
            0.0
        }
    }

    fn need_filter(&self, sample: u32) -> bool {
        if !self.enabled || sample <= self.min_samples {
            return false;
        }
        sample & self.step_mask() == self.step_mask()
    }

    fn align_samples(&self, start_sample: u32, num_samples: u32) -> u32 {
        if !self.enabled {
            return num_samples;
        }

        let first_filter_sample = self.first_filter_sample();

        // Samples before the first filter can be rendered in one go.
        if start_sample.saturating_add(num_samples) <= first_filter_sample {
            return num_samples;
        }

        let next_filter_sample = first_filter_sample.max(start_sample | self.step_mask());
        let num_samples_until_filter = (next_filter_sample - start_sample).saturating_add(1);
        num_samples_until_filter.min(num_samples)
    }
}
