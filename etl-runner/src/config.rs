use batch_writer::OutputFormat;
use etl_core::ConfigError;
use reddit_client::{ApiSettings, RateLimitConfig, RetryConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Pipeline settings from an optional TOML file. Every section is optional.
///
/// ```toml
/// [api]
/// request_timeout_secs = 30
///
/// [retry]
/// max_attempts = 3
/// base_delay_ms = 2000
///
/// [rate_limit]
/// max_requests = 100
/// time_window_secs = 60
///
/// [output]
/// dir = "/var/lib/reddit-etl"
/// format = "jsonl"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub api: ApiSettings,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub format: OutputFormat,
    /// When set, batches go to this SQLite database instead of files.
    pub sqlite_url: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            format: OutputFormat::JsonLines,
            sqlite_url: None,
        }
    }
}

/// Command line values that take precedence over the `[output]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputOverrides {
    pub dir: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub sqlite_url: Option<String>,
}

impl PipelineConfig {
    /// Load `path` if given, otherwise start from defaults, then apply the
    /// command line overrides.
    pub fn resolve(path: Option<&Path>, overrides: &OutputOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &OutputOverrides) {
        if let Some(dir) = &overrides.dir {
            self.output.dir = dir.clone();
        }
        if let Some(format) = overrides.format {
            self.output.format = format;
        }
        if let Some(url) = &overrides.sqlite_url {
            self.output.sqlite_url = Some(url.clone());
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            value: format!("{} ({})", path.display(), e),
        })?;
        let config = Self::from_toml(&content)?;
        info!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, value: String| {
            Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value,
            })
        };

        if self.api.request_timeout_secs == 0 {
            return invalid("api.request_timeout_secs", "0".into());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts", "0".into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return invalid(
                "retry.backoff_multiplier",
                self.retry.backoff_multiplier.to_string(),
            );
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return invalid("retry.jitter_factor", self.retry.jitter_factor.to_string());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.base_delay_ms", self.retry.base_delay_ms.to_string());
        }
        if self.rate_limit.max_requests == 0 {
            return invalid("rate_limit.max_requests", "0".into());
        }
        if self.rate_limit.time_window_secs == 0 {
            return invalid("rate_limit.time_window_secs", "0".into());
        }
        Ok(())
    }
}
