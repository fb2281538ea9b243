use std::path::PathBuf;

use clap::Parser;
use sessionconfig::{BufferSettings, RenderMode, SessionConfig};

#[derive(Parser, Debug)]
#[command(
    name = "pathsched",
    author,
    version,
    about = "Drive the adaptive render scheduler against a simulated path tracer"
)]
pub struct Cli {
    /// Session configuration TOML file.
    #[arg(long, value_name = "FILE", env = "PATHSCHED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session mode: `interactive`, `background`, or `headless`.
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    pub mode: Option<RenderMode>,

    /// Number of samples to render per session.
    #[arg(long, value_name = "N")]
    pub samples: Option<u32>,

    /// Absolute index of the first sample.
    #[arg(long, value_name = "N")]
    pub start_sample: Option<u32>,

    /// Final render resolution (e.g. `1920x1080`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<BufferSettings>,

    /// Final resolution divider for hi-dpi displays (power of two).
    #[arg(long, value_name = "N")]
    pub pixel_size: Option<u32>,

    /// Enable the denoiser starting at the given number of samples.
    #[arg(long, value_name = "N", conflicts_with = "no_denoise")]
    pub denoise_start: Option<u32>,

    /// Disable the denoiser even if the configuration enables it.
    #[arg(long)]
    pub no_denoise: bool,

    /// Enable adaptive sampling with the configured step and threshold.
    #[arg(long)]
    pub adaptive: bool,

    /// Seed of the simulated timing jitter.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Number of sessions to render back to back.
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub resets: u32,

    /// Print one JSON object per work item and session to stdout.
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

impl Cli {
    /// Applies command line overrides on top of the configuration.
    pub fn apply_overrides(&self, config: &mut SessionConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(samples) = self.samples {
            config.num_samples = samples;
        }
        if let Some(start_sample) = self.start_sample {
            config.start_sample = start_sample;
        }
        if let Some(size) = self.size {
            config.buffer = size;
        }
        if let Some(pixel_size) = self.pixel_size {
            config.pixel_size = pixel_size;
        }
        if let Some(start_sample) = self.denoise_start {
            config.denoise.enabled = true;
            config.denoise.start_sample = start_sample;
        }
        if self.no_denoise {
            config.denoise.enabled = false;
        }
        if self.adaptive {
            config.adaptive_sampling.enabled = true;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
    }
}

pub fn parse_mode(value: &str) -> Result<RenderMode, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("mode must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "interactive" | "viewport" => Ok(RenderMode::Interactive),
        "background" | "final" => Ok(RenderMode::Background),
        "headless" => Ok(RenderMode::Headless),
        other => Err(format!(
            "unknown mode '{other}'; expected interactive, background, or headless"
        )),
    }
}

pub fn parse_size(value: &str) -> Result<BufferSettings, String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok(BufferSettings { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!(parse_mode("interactive").unwrap(), RenderMode::Interactive);
        assert_eq!(parse_mode(" Background ").unwrap(), RenderMode::Background);
        assert_eq!(parse_mode("headless").unwrap(), RenderMode::Headless);
        assert!(parse_mode("").is_err());
        assert!(parse_mode("offline").is_err());
    }

    #[test]
    fn parses_sizes() {
        assert_eq!(
            parse_size("1280x720").unwrap(),
            BufferSettings {
                width: 1280,
                height: 720
            }
        );
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let cli = Cli::parse_from([
            "pathsched",
            "--mode",
            "headless",
            "--samples",
            "32",
            "--size",
            "640x480",
            "--denoise-start",
            "4",
            "--adaptive",
        ]);
        let mut config = SessionConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.mode, RenderMode::Headless);
        assert_eq!(config.num_samples, 32);
        assert_eq!(config.buffer.width, 640);
        assert!(config.denoise.enabled);
        assert_eq!(config.denoise.start_sample, 4);
        assert!(config.adaptive_sampling.enabled);
        assert_eq!(cli.resets, 2);
    }

    #[test]
    fn no_denoise_conflicts_with_denoise_start() {
        let result = Cli::try_parse_from(["pathsched", "--no-denoise", "--denoise-start", "2"]);
        assert!(result.is_err());
    }
}
