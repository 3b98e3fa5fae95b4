//! Configuration file handling

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Device under test
    #[serde(default)]
    pub device: DeviceConfig,

    /// Retry policy for endpoint calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Settle delays between commands and their verification
    #[serde(default)]
    pub settle: SettleConfig,

    /// Numeric tolerances
    #[serde(default)]
    pub tolerance: ToleranceConfig,
}

/// Device under test settings
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Host or host:port of the device
    #[serde(default = "default_address")]
    pub address: String,

    /// Device family to exercise ("dummy", "incubator", "pcr")
    #[serde(default = "default_family")]
    pub family: String,

    /// Optional semver requirement on the reported firmware version
    #[serde(default)]
    pub min_firmware: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            family: default_family(),
            min_firmware: None,
        }
    }
}

/// Access-point address the firmware serves from before provisioning
pub const DEFAULT_ADDRESS: &str = "192.168.4.1";

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_family() -> String {
    "dummy".to_string()
}

/// Retry settings
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Length of one backoff unit in milliseconds
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,

    /// Attempts for ordinary queries
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Attempts for lifecycle controls and configuration reads
    #[serde(default = "default_control_attempts")]
    pub control_attempts: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            unit_ms: default_unit_ms(),
            attempts: default_attempts(),
            control_attempts: default_control_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_unit_ms() -> u64 {
    1000
}
fn default_attempts() -> u32 {
    2
}
fn default_control_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    10
}

/// How the sequencer waits for asynchronous device transitions
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettleMode {
    /// Sleep a fixed delay, then verify once
    #[default]
    Fixed,
    /// Re-query until the predicate holds or the poll timeout elapses
    Poll,
}

/// Settle delays in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct SettleConfig {
    #[serde(default)]
    pub mode: SettleMode,

    #[serde(default = "default_after_start")]
    pub after_start_ms: u64,

    #[serde(default = "default_after_stop")]
    pub after_stop_ms: u64,

    #[serde(default = "default_after_setpoint")]
    pub after_setpoint_ms: u64,

    #[serde(default = "default_after_pause")]
    pub after_pause_ms: u64,

    /// Recovery pause before configuration reads
    #[serde(default = "default_before_config")]
    pub before_config_ms: u64,

    /// Pause before the lifecycle bracket begins
    #[serde(default = "default_before_control")]
    pub before_control_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            mode: SettleMode::default(),
            after_start_ms: default_after_start(),
            after_stop_ms: default_after_stop(),
            after_setpoint_ms: default_after_setpoint(),
            after_pause_ms: default_after_pause(),
            before_config_ms: default_before_config(),
            before_control_ms: default_before_control(),
            poll_interval_ms: default_poll_interval(),
            poll_timeout_ms: default_poll_timeout(),
        }
    }
}

impl SettleConfig {
    /// Settle configuration with every delay set to zero
    pub fn immediate() -> Self {
        Self {
            mode: SettleMode::Fixed,
            after_start_ms: 0,
            after_stop_ms: 0,
            after_setpoint_ms: 0,
            after_pause_ms: 0,
            before_config_ms: 0,
            before_control_ms: 0,
            poll_interval_ms: 10,
            poll_timeout_ms: 200,
        }
    }

    pub fn after_start(&self) -> Duration {
        Duration::from_millis(self.after_start_ms)
    }
    pub fn after_stop(&self) -> Duration {
        Duration::from_millis(self.after_stop_ms)
    }
    pub fn after_setpoint(&self) -> Duration {
        Duration::from_millis(self.after_setpoint_ms)
    }
    pub fn after_pause(&self) -> Duration {
        Duration::from_millis(self.after_pause_ms)
    }
}

fn default_after_start() -> u64 {
    2000
}
fn default_after_stop() -> u64 {
    2000
}
fn default_after_setpoint() -> u64 {
    1000
}
fn default_after_pause() -> u64 {
    500
}
fn default_before_config() -> u64 {
    2000
}
fn default_before_control() -> u64 {
    1000
}
fn default_poll_interval() -> u64 {
    250
}
fn default_poll_timeout() -> u64 {
    5000
}

/// Numeric tolerances
#[derive(Debug, Deserialize, Clone)]
pub struct ToleranceConfig {
    /// Absolute tolerance when comparing a read-back setpoint
    #[serde(default = "default_setpoint_tolerance")]
    pub setpoint: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            setpoint: default_setpoint_tolerance(),
        }
    }
}

fn default_setpoint_tolerance() -> f64 {
    0.1
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry.attempts == 0 || self.retry.control_attempts == 0 {
            return Err(Error::Config(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.timeout_secs == 0 {
            return Err(Error::Config("retry.timeout_secs must be positive".to_string()));
        }
        if !(self.tolerance.setpoint.is_finite() && self.tolerance.setpoint >= 0.0) {
            return Err(Error::Config(
                "tolerance.setpoint must be a non-negative number".to_string(),
            ));
        }
        if let Some(req) = &self.device.min_firmware {
            semver::VersionReq::parse(req).map_err(|e| {
                Error::Config(format!("device.min_firmware '{}' is not a version requirement: {}", req, e))
            })?;
        }
        Ok(())
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.retry.timeout_secs)
    }
}
