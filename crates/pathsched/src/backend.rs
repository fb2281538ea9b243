use std::time::Duration;

use rand::prelude::*;
use scheduler::{BufferParams, ManualClock, RenderWork};
use sessionconfig::SimulationSettings;

/// Stand-in for the path tracer, denoiser and display.
///
/// Every stage advances the shared virtual clock by its simulated duration,
/// which is what the scheduler observes as wall time.
pub struct SimulatedBackend {
    settings: SimulationSettings,
    buffer: BufferParams,
    clock: ManualClock,
    rng: StdRng,
}

impl SimulatedBackend {
    pub fn new(settings: &SimulationSettings, buffer: BufferParams, clock: ManualClock) -> Self {
        Self {
            settings: settings.clone(),
            buffer,
            clock,
            rng: StdRng::seed_from_u64(settings.seed),
        }
    }

    pub fn path_trace(&mut self, work: &RenderWork) -> f64 {
        // The filter pass costs roughly as much as one sample.
        let units = work.path_trace.num_samples + u32::from(work.path_trace.adaptive_filter);
        self.run_stage(self.settings.sample_time, work.resolution_divider, units)
    }

    pub fn denoise(&mut self, work: &RenderWork) -> f64 {
        self.run_stage(self.settings.denoise_time, work.resolution_divider, 1)
    }

    pub fn update_display(&mut self, work: &RenderWork) -> f64 {
        self.run_stage(self.settings.display_time, work.resolution_divider, 1)
    }

    /// Fraction of the full resolution pixels rendered at the divider.
    fn pixel_fraction(&self, resolution_divider: u32) -> f64 {
        let divider = resolution_divider.max(1);
        let width = (self.buffer.width / divider).max(1);
        let height = (self.buffer.height / divider).max(1);
        let full = f64::from(self.buffer.width) * f64::from(self.buffer.height);
        f64::from(width) * f64::from(height) / full
    }

    fn run_stage(&mut self, unit_time: Duration, resolution_divider: u32, units: u32) -> f64 {
        let jitter = if self.settings.jitter > 0.0 {
            self.rng.gen_range(-self.settings.jitter..=self.settings.jitter)
        } else {
            0.0
        };
        let time = unit_time.as_secs_f64()
            * f64::from(units)
            * self.pixel_fraction(resolution_divider)
            * (1.0 + jitter);
        self.clock.advance(time);
        time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler::TimeSource;

    fn settings(jitter: f64) -> SimulationSettings {
        SimulationSettings {
            sample_time: Duration::from_millis(8),
            denoise_time: Duration::from_millis(40),
            display_time: Duration::from_millis(4),
            jitter,
            ..SimulationSettings::default()
        }
    }

    fn work(resolution_divider: u32, num_samples: u32) -> RenderWork {
        let mut work = RenderWork {
            resolution_divider,
            ..RenderWork::default()
        };
        work.path_trace.num_samples = num_samples;
        work
    }

    #[test]
    fn stage_time_scales_with_samples_and_pixels() {
        let clock = ManualClock::new();
        let buffer = BufferParams::new(1024, 1024).unwrap();
        let mut backend = SimulatedBackend::new(&settings(0.0), buffer, clock.clone());

        let full = backend.path_trace(&work(1, 4));
        assert!((full - 0.032).abs() < 1e-12);

        let quarter = backend.path_trace(&work(2, 4));
        assert!((quarter - 0.008).abs() < 1e-12);

        assert!((clock.now() - 0.040).abs() < 1e-12);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let buffer = BufferParams::new(64, 64).unwrap();
        let mut backend = SimulatedBackend::new(&settings(0.5), buffer, ManualClock::new());
        for _ in 0..100 {
            let time = backend.denoise(&work(1, 0));
            assert!((0.02..=0.06).contains(&time), "time {time}");
        }
    }

    #[test]
    fn tiny_buffers_keep_at_least_one_pixel() {
        let buffer = BufferParams::new(4, 4).unwrap();
        let backend = SimulatedBackend::new(&settings(0.0), buffer, ManualClock::new());
        assert_eq!(backend.pixel_fraction(16), 1.0 / 16.0);
    }
}
