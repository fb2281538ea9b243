use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::work::RenderWork;

/// Running average of the time spent per unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeAverage {
    total_time: f64,
    num_measured_times: u32,
}

impl TimeAverage {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Accounts `time` seconds spent on `count` units of work.
    pub fn add(&mut self, time: f64, count: u32) {
        self.total_time += time;
        self.num_measured_times = self.num_measured_times.saturating_add(count);
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn num_measured_times(&self) -> u32 {
        self.num_measured_times
    }

    /// Average time per unit of work.
    ///
    /// Panics when nothing has been measured yet.
    pub fn average(&self) -> f64 {
        assert!(
            self.num_measured_times > 0,
            "time average queried before any time was measured"
        );
        self.total_time / f64::from(self.num_measured_times)
    }

    pub fn checked_average(&self) -> Option<f64> {
        (self.num_measured_times > 0).then(|| self.average())
    }
}

/// Timings of the very first render work at the final resolution, scaled to
/// full resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct FirstRenderTime {
    pub path_trace: Option<f64>,
    pub denoise: f64,
    pub display_update: f64,
}

impl FirstRenderTime {
    pub fn total(&self) -> Option<f64> {
        self.path_trace
            .map(|path_trace| path_trace + self.denoise + self.display_update)
    }
}

/// Approximates how long the task measured at the work's resolution divider
/// would take at the full resolution. Cost is proportional to the pixel count.
pub fn approximate_final_time(work: &RenderWork, time: f64) -> f64 {
    if work.resolution_divider == 1 {
        return time;
    }
    let divider = f64::from(work.resolution_divider);
    time * divider * divider
}

/// Abstraction over where wall-clock time originates from.
pub trait TimeSource: Send {
    /// Monotonic time in seconds.
    fn now(&self) -> f64;
}

/// Convenient alias for owning time sources behind trait objects.
pub type BoxedTimeSource = Box<dyn TimeSource>;

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
