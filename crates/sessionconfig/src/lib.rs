use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the session is consumed.
///
/// Headless sessions are background sessions without any display attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Interactive,
    Background,
    Headless,
}

impl RenderMode {
    pub fn is_background(self) -> bool {
        matches!(self, RenderMode::Background | RenderMode::Headless)
    }

    pub fn is_headless(self) -> bool {
        matches!(self, RenderMode::Headless)
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderMode::Interactive => "interactive",
            RenderMode::Background => "background",
            RenderMode::Headless => "headless",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub version: u32,
    #[serde(default)]
    pub mode: RenderMode,
    #[serde(default = "default_pixel_size")]
    pub pixel_size: u32,
    #[serde(default)]
    pub start_sample: u32,
    #[serde(default = "default_num_samples")]
    pub num_samples: u32,
    #[serde(default)]
    pub buffer: BufferSettings,
    #[serde(default)]
    pub denoise: DenoiseSettings,
    #[serde(default)]
    pub adaptive_sampling: AdaptiveSamplingSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct BufferSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DenoiseSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_denoise_start_sample")]
    pub start_sample: u32,
}

impl Default for DenoiseSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_sample: default_denoise_start_sample(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AdaptiveSamplingSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_adaptive_step")]
    pub adaptive_step: u32,
    #[serde(default)]
    pub min_samples: u32,
    #[serde(default = "default_adaptive_threshold")]
    pub threshold: f32,
}

impl Default for AdaptiveSamplingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            adaptive_step: default_adaptive_step(),
            min_samples: 0,
            threshold: default_adaptive_threshold(),
        }
    }
}

/// Cost model of the simulated backend used by the driving loop.
///
/// All times are at full resolution; the driver scales them by the pixel
/// fraction of the scheduled resolution divider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationSettings {
    #[serde(
        default = "default_sample_time",
        deserialize_with = "deserialize_duration"
    )]
    pub sample_time: Duration,
    #[serde(
        default = "default_denoise_time",
        deserialize_with = "deserialize_duration"
    )]
    pub denoise_time: Duration,
    #[serde(
        default = "default_display_time",
        deserialize_with = "deserialize_duration"
    )]
    pub display_time: Duration,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Number of rendered samples after which adaptive sampling reports
    /// convergence and path tracing stops early.
    #[serde(default)]
    pub converge_at: Option<u32>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            sample_time: default_sample_time(),
            denoise_time: default_denoise_time(),
            display_time: default_display_time(),
            jitter: default_jitter(),
            seed: default_seed(),
            converge_at: None,
        }
    }
}

fn default_pixel_size() -> u32 {
    1
}

fn default_num_samples() -> u32 {
    128
}

fn default_denoise_start_sample() -> u32 {
    1
}

fn default_adaptive_step() -> u32 {
    16
}

fn default_adaptive_threshold() -> f32 {
    0.01
}

fn default_sample_time() -> Duration {
    Duration::from_millis(4)
}

fn default_denoise_time() -> Duration {
    Duration::from_millis(30)
}

fn default_display_time() -> Duration {
    Duration::from_millis(2)
}

fn default_jitter() -> f64 {
    0.1
}

fn default_seed() -> u64 {
    1
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: 1,
            mode: RenderMode::default(),
            pixel_size: default_pixel_size(),
            start_sample: 0,
            num_samples: default_num_samples(),
            buffer: BufferSettings::default(),
            denoise: DenoiseSettings::default(),
            adaptive_sampling: AdaptiveSamplingSettings::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SessionConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if !self.pixel_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "pixel_size must be a power of two >= 1, got {}",
                self.pixel_size
            )));
        }

        if self.start_sample.checked_add(self.num_samples).is_none() {
            return Err(ConfigError::Invalid(format!(
                "sample range starting at {} with {} samples exceeds the last sample index",
                self.start_sample, self.num_samples
            )));
        }

        if self.buffer.width == 0 || self.buffer.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "buffer dimensions must be greater than zero, got {}x{}",
                self.buffer.width, self.buffer.height
            )));
        }

        let adaptive = &self.adaptive_sampling;
        if !adaptive.adaptive_step.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "adaptive_sampling.adaptive_step must be a power of two, got {}",
                adaptive.adaptive_step
            )));
        }

        if adaptive.threshold.is_nan() || adaptive.threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "adaptive_sampling.threshold must be >= 0".into(),
            ));
        }

        let simulation = &self.simulation;
        if simulation.sample_time.is_zero() {
            return Err(ConfigError::Invalid(
                "simulation.sample_time must be greater than zero".into(),
            ));
        }

        if !(0.0..1.0).contains(&simulation.jitter) {
            return Err(ConfigError::Invalid(format!(
                "simulation.jitter must be within [0, 1), got {}",
                simulation.jitter
            )));
        }

        if simulation.converge_at == Some(0) {
            return Err(ConfigError::Invalid(
                "simulation.converge_at must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
mode = "interactive"
pixel_size = 2
start_sample = 4
num_samples = 256

[buffer]
width = 1280
height = 720

[denoise]
enabled = true
start_sample = 8

[adaptive_sampling]
enabled = true
adaptive_step = 8
min_samples = 16
threshold = 0.05

[simulation]
sample_time = "6ms"
denoise_time = 0.025
display_time = "1ms 500us"
jitter = 0.2
seed = 9
converge_at = 96
"#;

    #[test]
    fn parses_sample_config() {
        let config = SessionConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.mode, RenderMode::Interactive);
        assert_eq!(config.pixel_size, 2);
        assert_eq!(config.start_sample, 4);
        assert_eq!(config.num_samples, 256);
        assert_eq!(
            config.buffer,
            BufferSettings {
                width: 1280,
                height: 720
            }
        );
        assert!(config.denoise.enabled);
        assert_eq!(config.denoise.start_sample, 8);
        assert!(config.adaptive_sampling.enabled);
        assert_eq!(config.adaptive_sampling.adaptive_step, 8);
        assert_eq!(config.adaptive_sampling.min_samples, 16);
        assert_eq!(config.simulation.sample_time, Duration::from_millis(6));
        assert_eq!(config.simulation.denoise_time, Duration::from_millis(25));
        assert_eq!(config.simulation.display_time, Duration::from_micros(1500));
        assert_eq!(config.simulation.converge_at, Some(96));
    }

    #[test]
    fn applies_defaults_for_missing_sections() {
        let config = SessionConfig::from_toml_str("version = 1\nmode = \"headless\"\n").unwrap();
        assert_eq!(config.mode, RenderMode::Headless);
        assert!(config.mode.is_background());
        assert_eq!(config.pixel_size, 1);
        assert_eq!(config.num_samples, 128);
        assert_eq!(config.buffer, BufferSettings::default());
        assert!(!config.denoise.enabled);
        assert_eq!(config.denoise.start_sample, 1);
        assert!(!config.adaptive_sampling.enabled);
        assert_eq!(config.simulation.sample_time, Duration::from_millis(4));
        assert_eq!(config.simulation.converge_at, None);
    }

    #[test]
    fn rejects_non_power_of_two_pixel_size() {
        let err = SessionConfig::from_toml_str("version = 1\npixel_size = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_sample_range_past_last_index() {
        let config = "version = 1\nstart_sample = 4294967290\nnum_samples = 100\n";
        let err = SessionConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = "version = 1\nstart_sample = 4294967195\nnum_samples = 100\n";
        assert!(SessionConfig::from_toml_str(config).is_ok());
    }

    #[test]
    fn rejects_invalid_adaptive_step() {
        let config = r#"
version = 1

[adaptive_sampling]
enabled = true
adaptive_step = 12
"#;
        let err = SessionConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_version_and_mode() {
        let err = SessionConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SessionConfig::from_toml_str("version = 1\nmode = \"viewport\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_negative_duration() {
        let config = r#"
version = 1

[simulation]
denoise_time = -1
"#;
        let err = SessionConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn default_config_is_valid() {
        SessionConfig::default().validate().expect("default config");
    }
}
