//! Tuning configuration loaded from a TOML file.

use crate::Result;
use crate::details::{DetailSettings, MAX_BATCH_SIZE};
use crate::github::ExecutorSettings;
use crate::search::SearchSettings;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../default_config.toml");

/// File looked up in the working directory when no configuration path is given
pub const CONFIG_FILE_NAME: &str = "cve-finder.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// GraphQL endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Repositories requested per search page
    #[serde(default = "default_page_size")]
    pub page_size: u8,

    /// Result count at which a date range is split
    #[serde(default = "default_result_cap")]
    pub result_cap: u64,

    /// Repositories per composite document query
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Revision expression naming the scanned document
    #[serde(default = "default_document_expression")]
    pub document_expression: String,

    /// Earliest creation time searched
    #[serde(default = "default_search_start")]
    pub search_start: DateTime<Utc>,

    /// Delay added after a primary rate limit reset
    #[serde(default = "default_reset_buffer", with = "humantime_serde")]
    pub reset_buffer: Duration,

    /// First secondary rate limit backoff
    #[serde(default = "default_secondary_backoff", with = "humantime_serde")]
    pub secondary_backoff: Duration,

    /// Ceiling for the secondary rate limit backoff
    #[serde(default = "default_max_secondary_backoff", with = "humantime_serde")]
    pub max_secondary_backoff: Duration,

    /// Timeout for each HTTP request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_endpoint() -> String {
    "https://api.github.com/graphql".to_string()
}

const fn default_page_size() -> u8 {
    100
}

const fn default_result_cap() -> u64 {
    1000
}

const fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_document_expression() -> String {
    "HEAD:README.md".to_string()
}

fn default_search_start() -> DateTime<Utc> {
    // GitHub's launch date
    DateTime::from_timestamp(1_202_428_800, 0).unwrap_or_default()
}

const fn default_reset_buffer() -> Duration {
    Duration::from_secs(3)
}

const fn default_secondary_backoff() -> Duration {
    Duration::from_secs(60)
}

const fn default_max_secondary_backoff() -> Duration {
    Duration::from_secs(600)
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `cve-finder.toml` in `base_dir` is used when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or holds out-of-range values
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8Path>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.to_path_buf(), text)
        } else {
            let path: Utf8PathBuf = base_dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        log::debug!(target: "    config", "Loaded configuration from '{final_path}'");
        Ok(config)
    }

    /// Save the default configuration to a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range or inconsistent
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.page_size) {
            return Err(app_err!("page_size must be between 1 and 100, got {}", self.page_size));
        }

        if self.result_cap == 0 {
            return Err(app_err!("result_cap must be greater than 0"));
        }

        if !(2..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(app_err!("batch_size must be between 2 and {MAX_BATCH_SIZE}, got {}", self.batch_size));
        }

        if self.document_expression.trim().is_empty() {
            return Err(app_err!("document_expression must not be empty"));
        }

        if url::Url::parse(&self.endpoint).is_err() {
            return Err(app_err!("endpoint '{}' is not a valid URL", self.endpoint));
        }

        if self.secondary_backoff.is_zero() {
            return Err(app_err!("secondary_backoff must be greater than 0"));
        }

        if self.max_secondary_backoff < self.secondary_backoff {
            return Err(app_err!(
                "max_secondary_backoff ({:?}) must not be less than secondary_backoff ({:?})",
                self.max_secondary_backoff,
                self.secondary_backoff
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(app_err!("request_timeout must be greater than 0"));
        }

        Ok(())
    }

    #[must_use]
    pub const fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            reset_buffer: self.reset_buffer,
            secondary_backoff: self.secondary_backoff,
            max_secondary_backoff: self.max_secondary_backoff,
        }
    }

    #[must_use]
    pub const fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            page_size: self.page_size,
            result_cap: self.result_cap,
        }
    }

    #[must_use]
    pub fn detail_settings(&self) -> DetailSettings {
        DetailSettings {
            batch_size: self.batch_size,
            expression: self.document_expression.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
