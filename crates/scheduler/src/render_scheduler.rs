use sessionconfig::{RenderMode, SessionConfig};
use tracing::{debug, trace, warn};

use crate::adaptive::{AdaptiveSampling, AdaptiveSamplingPolicy};
use crate::divider::{
    resolution_divider_for_resolution, resolution_divider_for_time,
    round_num_samples_to_power_of_2,
};
use crate::params::{BufferParams, DenoiseParams};
use crate::timing::{
    approximate_final_time, BoxedTimeSource, FirstRenderTime, SystemClock, TimeAverage, TimeSource,
};
use crate::work::RenderWork;
use crate::SchedulerError;

/// Target resolution of the first navigation update when there is no timing
/// information yet. Also the lowest resolution the scheduler picks on its own.
pub const DEFAULT_START_RESOLUTION: u32 = 64;

/// Samples per update while navigating at a coarse resolution.
pub const NUM_SAMPLES_DURING_NAVIGATION: u32 = 4;

/// Denoising is throttled once this many samples are rendered...
pub const DENOISE_THROTTLE_MIN_SAMPLES: u32 = 20;
/// ...and the display was updated less than this many seconds ago.
pub const DENOISE_THROTTLE_INTERVAL: f64 = 1.0;

/// Slack allowed on top of the navigation update interval before the
/// resolution is lowered.
pub const NAVIGATION_TIME_TOLERANCE: f64 = 1.4;

/// Navigation update interval when the denoiser runs during navigation.
pub const NAVIGATION_INTERVAL_DENOISED: f64 = 1.0 / 12.0;
/// Navigation update interval without denoising.
pub const NAVIGATION_INTERVAL: f64 = 1.0 / 30.0;

/// Display update interval of headless sessions.
pub const HEADLESS_UPDATE_INTERVAL: f64 = 30.0;

#[derive(Debug, Clone, Copy, Default)]
struct SchedulingState {
    resolution_divider: u32,
    /// Number of rendered samples on top of the start sample.
    num_rendered_samples: u32,
    /// Moment the latest display update was scheduled or completed.
    last_display_update_time: Option<f64>,
    /// Number of rendered samples at the latest display update.
    last_display_update_sample: Option<u32>,
    path_trace_finished: bool,
}

/// Decides how much work to hand to the renderer next.
///
/// The scheduler is driven by a single thread: every [`get_render_work`] is
/// followed by the `report_*_time` calls for the parts of the work which were
/// performed, in the order the work was issued.
///
/// [`get_render_work`]: RenderScheduler::get_render_work
pub struct RenderScheduler {
    mode: RenderMode,
    /// Final resolution divider, used to render at a lower resolution on
    /// hi-dpi displays.
    pixel_size: u32,

    start_sample: u32,
    num_samples: u32,

    buffer_params: BufferParams,
    denoiser_params: DenoiseParams,
    adaptive_sampling: Box<dyn AdaptiveSamplingPolicy>,
    clock: BoxedTimeSource,

    state: SchedulingState,

    first_render_time: FirstRenderTime,
    path_trace_time: TimeAverage,
    denoise_time: TimeAverage,
    display_update_time: TimeAverage,

    /// Divider the next session starts navigation with. `None` until the
    /// first reset.
    start_resolution_divider: Option<u32>,
}

impl RenderScheduler {
    pub fn new(mode: RenderMode, pixel_size: u32) -> Result<Self, SchedulerError> {
        if !pixel_size.is_power_of_two() {
            return Err(SchedulerError::InvalidPixelSize(pixel_size));
        }
        Ok(Self {
            mode,
            pixel_size,
            start_sample: 0,
            num_samples: 0,
            buffer_params: BufferParams::default(),
            denoiser_params: DenoiseParams::default(),
            adaptive_sampling: Box::new(AdaptiveSampling::disabled()),
            clock: Box::new(SystemClock::new()),
            state: SchedulingState {
                resolution_divider: pixel_size,
                ..SchedulingState::default()
            },
            first_render_time: FirstRenderTime::default(),
            path_trace_time: TimeAverage::default(),
            denoise_time: TimeAverage::default(),
            display_update_time: TimeAverage::default(),
            start_resolution_divider: None,
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, SchedulerError> {
        let mut scheduler = Self::new(config.mode, config.pixel_size)?;
        scheduler.set_start_sample(config.start_sample);
        scheduler.set_num_samples(config.num_samples);
        scheduler.set_denoiser_params(DenoiseParams::from(&config.denoise));
        scheduler.set_adaptive_sampling(AdaptiveSampling::from_settings(
            &config.adaptive_sampling,
        )?);
        Ok(scheduler)
    }

    pub fn with_time_source(mut self, clock: impl TimeSource + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn is_background(&self) -> bool {
        self.mode.is_background()
    }

    pub fn pixel_size(&self) -> u32 {
        self.pixel_size
    }

    pub fn set_denoiser_params(&mut self, params: DenoiseParams) {
        self.denoiser_params = params;
    }

    pub fn set_adaptive_sampling(&mut self, adaptive_sampling: impl AdaptiveSamplingPolicy + 'static) {
        self.adaptive_sampling = Box::new(adaptive_sampling);
    }

    /// First sample of the range the scheduler schedules work for.
    ///
    /// The sample count is shortened when the range would no longer fit the
    /// sample index type.
    pub fn set_start_sample(&mut self, start_sample: u32) {
        self.start_sample = start_sample;
        self.num_samples = self.clamp_num_samples(self.num_samples);
    }

    pub fn start_sample(&self) -> u32 {
        self.start_sample
    }

    /// Samples `[start_sample, start_sample + num_samples - 1]` are scheduled.
    pub fn set_num_samples(&mut self, num_samples: u32) {
        self.num_samples = self.clamp_num_samples(num_samples);
    }

    fn clamp_num_samples(&self, num_samples: u32) -> u32 {
        let max_num_samples = u32::MAX - self.start_sample;
        if num_samples > max_num_samples {
            warn!(
                start_sample = self.start_sample,
                requested = num_samples,
                clamped = max_num_samples,
                "sample range exceeds the last representable sample"
            );
            return max_num_samples;
        }
        num_samples
    }

    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }

    /// Absolute 0-based index of the last scheduled sample.
    ///
    /// Panics when no samples were scheduled since the last reset.
    pub fn rendered_sample(&self) -> u32 {
        assert!(
            self.state.num_rendered_samples > 0,
            "rendered sample queried before any sample was scheduled"
        );
        self.start_sample
            .saturating_add(self.state.num_rendered_samples - 1)
    }

    /// Number of samples scheduled at the current resolution since the last
    /// reset, relative to the start sample.
    pub fn num_rendered_samples(&self) -> u32 {
        self.state.num_rendered_samples
    }

    pub fn resolution_divider(&self) -> u32 {
        self.state.resolution_divider
    }

    pub fn start_resolution_divider(&self) -> Option<u32> {
        self.start_resolution_divider
    }

    /// Starts rendering from scratch.
    ///
    /// Timing history of the previous session is used to pick the resolution
    /// divider navigation starts with.
    pub fn reset(&mut self, buffer_params: BufferParams, num_samples: u32) {
        self.buffer_params = buffer_params;

        self.update_start_resolution_divider();

        self.set_num_samples(num_samples);

        self.state.resolution_divider = if self.is_background() {
            // Lower resolution previews are not supported in background mode.
            self.pixel_size
        } else {
            // Doubled since the first get_render_work() halves it before
            // scheduling anything.
            self.start_resolution_divider
                .unwrap_or(self.pixel_size)
                .saturating_mul(2)
        };

        self.state.num_rendered_samples = 0;
        self.state.last_display_update_time = None;
        self.state.last_display_update_sample = None;
        self.state.path_trace_finished = false;

        self.first_render_time = FirstRenderTime::default();

        self.path_trace_time.reset();
        self.denoise_time.reset();
        self.display_update_time.reset();
    }

    /// Marks path tracing as finished due to adaptive sampling convergence.
    ///
    /// Denoising and display update of the given work are re-evaluated so
    /// that the final result is presented.
    pub fn set_path_trace_finished(&mut self, render_work: &mut RenderWork) {
        self.state.path_trace_finished = true;

        let (denoise, denoiser_delayed) = self.work_need_denoise();
        render_work.denoise = denoise;
        render_work.update_display = self.work_need_update_display(denoiser_delayed);
    }

    /// Whether all work has been scheduled.
    pub fn done(&self) -> bool {
        if self.state.resolution_divider != self.pixel_size {
            return false;
        }
        if self.state.path_trace_finished {
            return true;
        }
        self.state.num_rendered_samples >= self.num_samples
    }

    pub fn get_render_work(&mut self) -> RenderWork {
        if self.done() {
            return RenderWork::default();
        }

        if self.state.resolution_divider != self.pixel_size {
            self.state.resolution_divider = (self.state.resolution_divider / 2).max(self.pixel_size);
            self.state.num_rendered_samples = 0;
            self.state.last_display_update_sample = None;
        }

        let mut render_work = RenderWork {
            resolution_divider: self.state.resolution_divider,
            ..RenderWork::default()
        };

        render_work.path_trace.start_sample = self.start_sample_to_path_trace();
        render_work.path_trace.num_samples = self.num_samples_to_path_trace();

        // Advance now, so that the filter and denoise checks see the samples
        // of this work as rendered.
        self.state.num_rendered_samples += render_work.path_trace.num_samples;

        if self.adaptive_sampling.is_enabled() {
            render_work.path_trace.adaptive_threshold = self.adaptive_sampling.threshold();
            if self.state.num_rendered_samples > 0 {
                render_work.path_trace.adaptive_filter =
                    self.adaptive_sampling.need_filter(self.rendered_sample());
            }
        }

        let (denoise, denoiser_delayed) = self.work_need_denoise();
        render_work.denoise = denoise;

        render_work.update_display = self.work_need_update_display(denoiser_delayed);

        // Fallback for when the display update time is never reported.
        if render_work.update_display {
            self.state.last_display_update_time = Some(self.clock.now());
            self.state.last_display_update_sample = Some(self.state.num_rendered_samples);
        }

        render_work
    }

    pub fn report_path_trace_time(&mut self, render_work: &RenderWork, time: f64) {
        let final_time_approx = approximate_final_time(render_work, time);

        if self.work_is_usable_for_first_render_estimation(render_work) {
            self.first_render_time.path_trace = Some(final_time_approx);
        }

        self.path_trace_time
            .add(final_time_approx, render_work.path_trace.num_samples);

        if let Some(average) = self.path_trace_time.checked_average() {
            trace!(average, "average path tracing time per sample");
        }
    }

    pub fn report_denoise_time(&mut self, render_work: &RenderWork, time: f64) {
        let final_time_approx = approximate_final_time(render_work, time);

        if self.work_is_usable_for_first_render_estimation(render_work) {
            self.first_render_time.denoise = final_time_approx;
        }

        self.denoise_time.add(final_time_approx, 1);

        trace!(average = self.denoise_time.average(), "average denoising time");
    }

    pub fn report_display_update_time(&mut self, render_work: &RenderWork, time: f64) {
        let final_time_approx = approximate_final_time(render_work, time);

        if self.work_is_usable_for_first_render_estimation(render_work) {
            self.first_render_time.display_update = final_time_approx;
        }

        self.display_update_time.add(final_time_approx, 1);

        trace!(
            average = self.display_update_time.average(),
            "average display update time"
        );

        // The actual moment of the display update, without the path tracing
        // and denoising parts of the work.
        self.state.last_display_update_time = Some(self.clock.now());
    }

    fn update_start_resolution_divider(&mut self) {
        let default_resolution_divider = resolution_divider_for_resolution(
            self.buffer_params.width,
            self.buffer_params.height,
            DEFAULT_START_RESOLUTION,
        )
        .max(self.pixel_size);

        if self.start_resolution_divider.is_none() {
            // No timing information yet: start with the default to collect
            // real numbers.
            self.start_resolution_divider = Some(default_resolution_divider);
            debug!(
                divider = default_resolution_divider,
                "initial resolution divider"
            );
            return;
        }

        let Some(actual_time_per_update) = self.first_render_time.total() else {
            // Not enough information, keep the existing divider.
            return;
        };

        let desired_update_interval = self.guess_viewport_navigation_update_interval();

        let resolution_divider_for_update = resolution_divider_for_time(
            desired_update_interval * NAVIGATION_TIME_TOLERANCE,
            actual_time_per_update,
        );

        // TODO: add hysteresis so the divider does not bounce between two
        // values when the render time sits on the boundary.
        let new_resolution_divider = resolution_divider_for_update
            .max(self.pixel_size)
            .min(default_resolution_divider);
        self.start_resolution_divider = Some(new_resolution_divider);

        debug!(
            divider = new_resolution_divider,
            actual_time = actual_time_per_update,
            desired_time = desired_update_interval,
            "calculated resolution divider"
        );
    }

    fn guess_viewport_navigation_update_interval(&self) -> f64 {
        if self.is_denoise_active_during_update() {
            // Leave room for the denoiser and give it more pixels to
            // reconstruct the image from.
            return NAVIGATION_INTERVAL_DENOISED;
        }
        NAVIGATION_INTERVAL
    }

    fn is_denoise_active_during_update(&self) -> bool {
        self.denoiser_params.enabled && self.denoiser_params.start_sample <= 1
    }

    fn guess_display_update_interval(&self) -> f64 {
        self.guess_display_update_interval_for_num_samples(self.state.num_rendered_samples)
    }

    /// Updates happen often at low sample counts and become rarer as the
    /// render converges, keeping the device occupied.
    ///
    /// The sample count is relative to the start sample.
    fn guess_display_update_interval_for_num_samples(&self, num_rendered_samples: u32) -> f64 {
        match self.mode {
            // Rare updates for high device occupancy, frequent enough for
            // progress logs.
            RenderMode::Headless => HEADLESS_UPDATE_INTERVAL,
            RenderMode::Background => {
                if num_rendered_samples < 32 {
                    1.0
                } else {
                    2.0
                }
            }
            RenderMode::Interactive => match num_rendered_samples {
                0..=3 => 0.1,
                4..=7 => 0.25,
                8..=15 => 0.5,
                16..=31 => 1.0,
                _ => 2.0,
            },
        }
    }

    fn calculate_num_samples_per_update(&self) -> u32 {
        let time_per_sample_average = self.path_trace_time.average();
        let update_interval = self.guess_display_update_interval();
        // `as` saturates, including the infinite rate of a zero average.
        ((update_interval / time_per_sample_average) as u32).max(1)
    }

    fn start_sample_to_path_trace(&self) -> u32 {
        self.start_sample
            .saturating_add(self.state.num_rendered_samples)
    }

    fn num_samples_to_path_trace(&self) -> u32 {
        if self.state.path_trace_finished {
            return 0;
        }

        // Several samples per update while navigating at a coarse resolution.
        // A single one right before the final resolution, so the lower
        // resolution does not take longer than the first full resolution
        // sample. Denoisers also prefer more pixels over more samples.
        if self.state.resolution_divider != self.pixel_size {
            if self.state.resolution_divider != self.pixel_size * 2
                && !self.is_denoise_active_during_update()
            {
                return self.num_samples.min(NUM_SAMPLES_DURING_NAVIGATION);
            }
            return 1;
        }

        // Fast first feedback which also seeds the timing averages.
        if self.state.num_rendered_samples == 0 {
            return 1;
        }

        let num_samples_per_update = self.calculate_num_samples_per_update();
        let path_trace_start_sample = self.start_sample_to_path_trace();

        // Power of two samples split into tiles more evenly.
        let num_samples_pot = round_num_samples_to_power_of_2(num_samples_per_update);

        // The sample count is clamped so the range end fits.
        let num_samples_remaining =
            (self.start_sample + self.num_samples).saturating_sub(path_trace_start_sample);
        let num_samples_to_render = num_samples_pot.min(num_samples_remaining);

        if !self.adaptive_sampling.is_enabled() {
            return num_samples_to_render;
        }

        self.adaptive_sampling
            .align_samples(path_trace_start_sample, num_samples_to_render)
    }

    /// Returns whether the current work needs denoising and whether denoising
    /// was skipped to reduce overhead.
    fn work_need_denoise(&self) -> (bool, bool) {
        if !self.denoiser_params.enabled {
            return (false, false);
        }

        if self.is_background() {
            // Single denoise pass of the final result.
            return (self.done(), false);
        }

        let num_samples_finished = self.state.num_rendered_samples;
        if num_samples_finished == self.denoiser_params.start_sample
            || num_samples_finished == self.num_samples
            || self.done()
        {
            return (true, false);
        }

        if num_samples_finished < self.denoiser_params.start_sample {
            return (false, false);
        }

        let delayed = num_samples_finished >= DENOISE_THROTTLE_MIN_SAMPLES
            && self.seconds_since_display_update() < DENOISE_THROTTLE_INTERVAL;

        (!delayed, delayed)
    }

    fn work_need_update_display(&self, denoiser_delayed: bool) -> bool {
        if self.mode.is_headless() {
            // Nothing to present the result on.
            return false;
        }

        if denoiser_delayed {
            // The display would not show the up-to-date result.
            return false;
        }

        if !self.adaptive_sampling.is_enabled() {
            // Batches keep the device busy long enough for the update to be
            // cheap in comparison.
            return true;
        }

        let Some(last_display_update_sample) = self.state.last_display_update_sample else {
            return true;
        };
        if self.done() {
            return true;
        }

        // Adaptive sampling might schedule small batches to not miss filter
        // samples, so skip updates which come too soon.
        let update_interval =
            self.guess_display_update_interval_for_num_samples(last_display_update_sample);
        self.seconds_since_display_update() > update_interval
    }

    fn seconds_since_display_update(&self) -> f64 {
        match self.state.last_display_update_time {
            Some(time) => self.clock.now() - time,
            None => f64::INFINITY,
        }
    }

    fn work_is_usable_for_first_render_estimation(&self, render_work: &RenderWork) -> bool {
        render_work.resolution_divider == self.pixel_size
            && render_work.path_trace.start_sample == self.start_sample
    }
}
