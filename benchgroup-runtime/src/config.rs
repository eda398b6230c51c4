use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Name of the configuration file picked up by [`BenchmarkConfig::load`]
pub const CONFIG_FILE: &str = "benchgroup.toml";

const DEFAULT_FRAMERATE: f64 = 30.0;

/// Errors from loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration for the sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Samples to collect before the time budget may end a test
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Hard cap on samples per test
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Time budget per test in milliseconds, checked after `min_samples`
    #[serde(default = "default_max_time_ms")]
    pub max_time_ms: u64,

    /// Target duration per sample in milliseconds (drives iteration calibration)
    #[serde(default = "default_target_sample_duration_ms")]
    pub target_sample_duration_ms: u64,

    /// Number of warmup body calls before calibration
    #[serde(default = "default_warmup_iterations")]
    pub warmup_iterations: usize,
}

fn default_min_samples() -> usize { 5 }
fn default_max_samples() -> usize { 10_000 }
fn default_max_time_ms() -> u64 { 1000 }
fn default_target_sample_duration_ms() -> u64 { 10 }
fn default_warmup_iterations() -> usize { 50 }

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            max_samples: default_max_samples(),
            max_time_ms: default_max_time_ms(),
            target_sample_duration_ms: default_target_sample_duration_ms(),
            warmup_iterations: default_warmup_iterations(),
        }
    }
}

impl MeasurementConfig {
    /// Reject settings the sampler cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if self.min_samples == 0 {
            return Err("min_samples must be greater than 0".to_string());
        }
        if self.max_samples < self.min_samples {
            return Err(format!(
                "max_samples ({}) must not be lower than min_samples ({})",
                self.max_samples, self.min_samples
            ));
        }
        if self.max_samples > 100_000 {
            return Err("max_samples should not exceed 100000 for reasonable execution time".to_string());
        }
        Ok(())
    }

    pub fn max_time(&self) -> Duration {
        Duration::from_millis(self.max_time_ms)
    }

    pub fn target_sample_duration(&self) -> Duration {
        Duration::from_millis(self.target_sample_duration_ms)
    }
}

/// Configuration for the live reporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Redraw after every sample instead of only on start/finish/error
    #[serde(default)]
    pub print_on_cycle: bool,

    /// Maximum redraws per second; infinity redraws on every request
    #[serde(default = "default_framerate")]
    pub framerate: f64,
}

fn default_framerate() -> f64 { DEFAULT_FRAMERATE }

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            print_on_cycle: false,
            framerate: default_framerate(),
        }
    }
}

impl ReporterConfig {
    /// Minimum time between two redraws
    ///
    /// An infinite framerate means no delay at all. NaN, negative infinity and
    /// values `<= 0` fall back to the default framerate.
    pub fn frame_interval(&self) -> Duration {
        let framerate = self.framerate;

        if framerate == f64::INFINITY {
            Duration::ZERO
        } else if !framerate.is_finite() || framerate <= 0.0 {
            Duration::from_secs_f64(1.0 / DEFAULT_FRAMERATE)
        } else {
            Duration::from_secs_f64(1.0 / framerate)
        }
    }
}

/// Complete benchgroup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BenchmarkConfig {
    #[serde(default)]
    pub measurement: MeasurementConfig,

    #[serde(default)]
    pub reporter: ReporterConfig,
}

impl BenchmarkConfig {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if Path::new(CONFIG_FILE).exists() {
            match Self::from_file(CONFIG_FILE) {
                Ok(file_config) => config = file_config,
                Err(err) => tracing::warn!("ignoring {}: {}", CONFIG_FILE, err),
            }
        }

        config.apply_env_overrides();

        config
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: BenchmarkConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = env_value("BENCHGROUP_MIN_SAMPLES") {
            self.measurement.min_samples = val;
        }

        if let Some(val) = env_value("BENCHGROUP_MAX_SAMPLES") {
            self.measurement.max_samples = val;
        }

        if let Some(val) = env_value("BENCHGROUP_MAX_TIME_MS") {
            self.measurement.max_time_ms = val;
        }

        if let Some(val) = env_value("BENCHGROUP_TARGET_DURATION_MS") {
            self.measurement.target_sample_duration_ms = val;
        }

        if let Some(val) = env_value("BENCHGROUP_WARMUP_ITERATIONS") {
            self.measurement.warmup_iterations = val;
        }

        if let Some(val) = env_value("BENCHGROUP_FRAMERATE") {
            self.reporter.framerate = val;
        }

        if std::env::var("BENCHGROUP_PRINT_ON_CYCLE").is_ok() {
            self.reporter.print_on_cycle = true;
        }
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }
}

fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
