use sessionconfig::{BufferSettings, DenoiseSettings};

use crate::SchedulerError;

/// Dimensions of the render buffer at the final resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferParams {
    pub width: u32,
    pub height: u32,
}

impl BufferParams {
    pub fn new(width: u32, height: u32) -> Result<Self, SchedulerError> {
        if width == 0 || height == 0 {
            return Err(SchedulerError::InvalidBufferSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn from_settings(settings: &BufferSettings) -> Result<Self, SchedulerError> {
        Self::new(settings.width, settings.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenoiseParams {
    pub enabled: bool,
    /// Number of rendered samples at which denoising starts.
    pub start_sample: u32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            enabled: false,
            start_sample: 1,
        }
    }
}

impl From<&DenoiseSettings> for DenoiseParams {
    fn from(settings: &DenoiseSettings) -> Self {
        Self {
            enabled: settings.enabled,
            start_sample: settings.start_sample,
        }
    }
}
