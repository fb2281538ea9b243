use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use scheduler::divider::resolution_for_divider;
use scheduler::{BufferParams, ManualClock, RenderScheduler, RenderWork, TimeSource};
use sessionconfig::SessionConfig;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::backend::SimulatedBackend;
use crate::cli::Cli;
use crate::report::{Record, SessionSummary, WorkRecord};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file at {}", path.display()))?;
            SessionConfig::from_toml_str(&contents)
                .with_context(|| format!("failed to load config file at {}", path.display()))?
        }
        None => SessionConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config
        .validate()
        .context("invalid configuration after applying command line overrides")?;
    Ok(config)
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let clock = ManualClock::new();
    let mut scheduler = RenderScheduler::from_config(&config)
        .context("failed to configure render scheduler")?
        .with_time_source(clock.clone());
    let buffer =
        BufferParams::from_settings(&config.buffer).context("invalid render buffer size")?;
    let mut backend = SimulatedBackend::new(&config.simulation, buffer, clock.clone());

    info!(
        mode = %config.mode,
        width = buffer.width,
        height = buffer.height,
        samples = config.num_samples,
        start_sample = config.start_sample,
        pixel_size = config.pixel_size,
        denoise = config.denoise.enabled,
        adaptive = config.adaptive_sampling.enabled,
        "starting simulated render"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut session = Session {
        config: &config,
        scheduler: &mut scheduler,
        backend: &mut backend,
        clock: &clock,
        buffer,
        json: cli.json,
    };
    for index in 0..cli.resets {
        let summary = session.render(index, &mut out)?;
        info!(
            session = summary.session,
            iterations = summary.iterations,
            samples = summary.rendered_samples,
            converged = summary.converged,
            elapsed = summary.elapsed,
            start_divider = ?summary.start_resolution_divider,
            "session finished"
        );
        if cli.json {
            writeln!(out, "{}", Record::Session(summary).to_json_line()?)?;
        }
    }
    out.flush()?;
    Ok(())
}

struct Session<'a> {
    config: &'a SessionConfig,
    scheduler: &'a mut RenderScheduler,
    backend: &'a mut SimulatedBackend,
    clock: &'a ManualClock,
    buffer: BufferParams,
    json: bool,
}

impl Session<'_> {
    /// Renders one reset-to-done session, reporting stage times back to the
    /// scheduler in the order the work was issued.
    fn render(&mut self, index: u32, out: &mut impl Write) -> Result<SessionSummary> {
        self.scheduler.reset(self.buffer, self.config.num_samples);
        let started = self.clock.now();
        let mut iterations = 0;
        let mut converged = false;

        loop {
            let mut work = self.scheduler.get_render_work();
            if work.is_empty() {
                break;
            }
            iterations += 1;

            let resolution = resolution_for_divider(
                self.buffer.width,
                self.buffer.height,
                work.resolution_divider,
            );
            let mut record = WorkRecord::new(index, iterations, &work, resolution);

            if work.path_trace.num_samples > 0 || work.path_trace.adaptive_filter {
                let time = self.backend.path_trace(&work);
                self.scheduler.report_path_trace_time(&work, time);
                record.path_trace_time = Some(time);

                if work.path_trace.adaptive_filter && self.has_converged(&work) {
                    self.scheduler.set_path_trace_finished(&mut work);
                    converged = true;
                    debug!(
                        samples = self.scheduler.num_rendered_samples(),
                        "adaptive sampling converged"
                    );
                }
            }

            if work.denoise {
                let time = self.backend.denoise(&work);
                self.scheduler.report_denoise_time(&work, time);
                record.denoise_time = Some(time);
            }

            if work.update_display {
                let time = self.backend.update_display(&work);
                self.scheduler.report_display_update_time(&work, time);
                record.display_time = Some(time);
            }

            record.denoise = work.denoise;
            record.update_display = work.update_display;
            record.clock = self.clock.now();

            info!(
                session = index,
                iteration = iterations,
                divider = work.resolution_divider,
                resolution,
                start = work.path_trace.start_sample,
                samples = work.path_trace.num_samples,
                filter = work.path_trace.adaptive_filter,
                denoise = work.denoise,
                display = work.update_display,
                "render work"
            );
            if self.json {
                writeln!(out, "{}", Record::Work(record).to_json_line()?)?;
            }
        }

        Ok(SessionSummary {
            session: index,
            iterations,
            rendered_samples: self.scheduler.num_rendered_samples(),
            start_resolution_divider: self.scheduler.start_resolution_divider(),
            converged,
            elapsed: self.clock.now() - started,
        })
    }

    /// Convergence is only meaningful at the final resolution.
    fn has_converged(&self, work: &RenderWork) -> bool {
        let Some(converge_at) = self.config.simulation.converge_at else {
            return false;
        };
        work.resolution_divider == self.scheduler.pixel_size()
            && self.scheduler.num_rendered_samples() >= converge_at
    }
}
