//! Adaptive scheduling of progressive path tracing work.
//!
//! [`RenderScheduler`] decides, call by call, how many samples to render at
//! which resolution and whether to denoise or refresh the display, based only
//! on the time reports of previously performed work.

mod adaptive;
pub mod divider;
mod params;
mod render_scheduler;
mod timing;
mod work;

pub use adaptive::{AdaptiveSampling, AdaptiveSamplingPolicy};
pub use params::{BufferParams, DenoiseParams};
pub use render_scheduler::{
    RenderScheduler, DEFAULT_START_RESOLUTION, DENOISE_THROTTLE_INTERVAL,
    DENOISE_THROTTLE_MIN_SAMPLES, HEADLESS_UPDATE_INTERVAL, NAVIGATION_INTERVAL,
    NAVIGATION_INTERVAL_DENOISED, NAVIGATION_TIME_TOLERANCE, NUM_SAMPLES_DURING_NAVIGATION,
};
pub use sessionconfig::RenderMode;
pub use timing::{
    approximate_final_time, BoxedTimeSource, ManualClock, SystemClock, TimeAverage, TimeSource,
};
pub use work::{PathTraceWork, RenderWork};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("pixel size must be a power of two >= 1, got {0}")]
    InvalidPixelSize(u32),
    #[error("buffer dimensions must be greater than zero, got {width}x{height}")]
    InvalidBufferSize { width: u32, height: u32 },
    #[error("adaptive sampling step must be a power of two, got {0}")]
    InvalidAdaptiveStep(u32),
}
