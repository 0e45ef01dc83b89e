//! Monitor configuration
//!
//! A polling interval is given either as a tick count in the implicit unit of
//! microseconds ([`MonitorConfig::from_ticks`]) or as an explicit
//! [`Duration`] ([`MonitorConfig::new`]). The probe timeout is optional; with
//! no timeout a probe blocks for as long as the host lock does.
//!
//! # Example lockknock.toml
//!
//! ```toml
//! polling_interval_us = 1000
//! probe_timeout_us = 1000000
//! ```

use crate::error::{MonitorError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default polling interval in microseconds
pub const DEFAULT_INTERVAL_TICKS: u64 = 10;

/// Polling interval and watchdog timeout for one monitor
///
/// Immutable once the monitor has started.
///
/// # Example
/// ```
/// use lockknock::config::MonitorConfig;
/// use std::time::Duration;
///
/// let config = MonitorConfig::from_ticks(1_000).with_probe_timeout(Duration::from_secs(1));
/// assert_eq!(config.polling_interval(), Duration::from_millis(1));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConfigFile", into = "ConfigFile")]
pub struct MonitorConfig {
    polling_interval: Duration,
    probe_timeout: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_ticks(DEFAULT_INTERVAL_TICKS)
    }
}

impl MonitorConfig {
    /// Poll every `polling_interval`, with no probe timeout
    pub fn new(polling_interval: Duration) -> Self {
        Self {
            polling_interval,
            probe_timeout: None,
        }
    }

    /// Poll every `ticks` microseconds
    pub fn from_ticks(ticks: u64) -> Self {
        Self::new(Duration::from_micros(ticks))
    }

    /// Fail a probe that cannot acquire the lock within `timeout`
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Let probes block indefinitely
    pub fn without_probe_timeout(mut self) -> Self {
        self.probe_timeout = None;
        self
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout
    }

    /// Validate configuration
    ///
    /// The interval must be non-zero, and a timeout (when set) must be longer
    /// than the interval so one slow cycle is not mistaken for a hang.
    pub fn validate(&self) -> Result<()> {
        if self.polling_interval.is_zero() {
            return Err(MonitorError::Config(
                "polling_interval must be > 0".to_string(),
            ));
        }

        if let Some(timeout) = self.probe_timeout {
            if timeout <= self.polling_interval {
                return Err(MonitorError::Config(format!(
                    "polling_interval ({:?}) must be less than probe_timeout ({:?})",
                    self.polling_interval, timeout
                )));
            }
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    ///
    /// ```no_run
    /// use lockknock::config::MonitorConfig;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = MonitorConfig::from_toml_file("lockknock.toml")?;
    /// println!("polling every {:?}", config.polling_interval());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid monitor configuration in {}", path.display()))
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string(self).context("Failed to serialize monitor configuration")
    }
}

/// On-disk form of [`MonitorConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default = "default_interval_us")]
    polling_interval_us: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probe_timeout_us: Option<u64>,
}

/// Largest microsecond count a TOML integer can hold
const MAX_FILE_MICROS: u64 = i64::MAX as u64;

fn file_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).map_or(MAX_FILE_MICROS, |us| us.min(MAX_FILE_MICROS))
}

fn default_interval_us() -> u64 {
    DEFAULT_INTERVAL_TICKS
}

impl TryFrom<ConfigFile> for MonitorConfig {
    type Error = MonitorError;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let mut config = MonitorConfig::from_ticks(file.polling_interval_us);
        if let Some(us) = file.probe_timeout_us {
            config = config.with_probe_timeout(Duration::from_micros(us));
        }
        config.validate()?;
        Ok(config)
    }
}

impl From<MonitorConfig> for ConfigFile {
    fn from(config: MonitorConfig) -> Self {
        ConfigFile {
            polling_interval_us: file_micros(config.polling_interval),
            probe_timeout_us: config.probe_timeout.map(file_micros),
        }
    }
}
