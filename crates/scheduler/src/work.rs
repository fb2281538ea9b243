/// Sample range to be path traced by a single render work.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathTraceWork {
    /// Absolute index of the first sample to render.
    pub start_sample: u32,
    /// Number of samples to render, starting from `start_sample`.
    pub num_samples: u32,
    /// Run the adaptive sampling filter once the samples are rendered.
    pub adaptive_filter: bool,
    /// Noise threshold of the adaptive sampling filter, 0 when inactive.
    pub adaptive_threshold: f32,
}

/// Unit of work handed to the driving loop by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderWork {
    /// Downsampling factor applied to both output dimensions.
    pub resolution_divider: u32,
    pub path_trace: PathTraceWork,
    /// Invoke the denoiser after path tracing.
    pub denoise: bool,
    /// Push the render result to the display after this work.
    pub update_display: bool,
}

impl Default for RenderWork {
    fn default() -> Self {
        Self {
            resolution_divider: 1,
            path_trace: PathTraceWork::default(),
            denoise: false,
            update_display: false,
        }
    }
}

impl RenderWork {
    /// True when there is nothing to be done for this work.
    pub fn is_empty(&self) -> bool {
        self.path_trace.num_samples == 0
            && !self.path_trace.adaptive_filter
            && !self.denoise
            && !self.update_display
    }

    pub fn has_work(&self) -> bool {
        !self.is_empty()
    }
}
