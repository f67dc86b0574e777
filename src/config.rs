//! Configuration: file-backed defaults with `VMC_*` environment overrides.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Driver configuration. Every field has a sensible default so a `vmcd`
/// invocation with no config file at all still runs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub serial_port: String,
    /// Baud rate. The VMC wire protocol is fixed at 57600.
    pub serial_baudrate: u32,
    /// Per-read timeout on the serial port, in milliseconds.
    pub serial_timeout_ms: u64,
    /// Per-attempt ACK deadline for a queued command, in milliseconds.
    pub vmc_command_timeout_ms: u64,
    /// Maximum send attempts per queued command before it is discarded.
    pub vmc_max_retries: u32,
    /// Expected POLL cadence from the VMC, in milliseconds. Informational
    /// only -- the engine reacts to POLLs as they arrive, it does not
    /// schedule them.
    pub vmc_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            serial_baudrate: 57600,
            serial_timeout_ms: 100,
            vmc_command_timeout_ms: 1000,
            vmc_max_retries: 5,
            vmc_poll_interval_ms: 200,
        }
    }
}

impl Config {
    /// Load configuration from `path` if it exists (falling back to
    /// defaults otherwise), then apply `VMC_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path).unwrap_or_else(|_| Self::default());
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VMC_SERIAL_PORT") {
            self.serial_port = v;
        }
        if let Some(v) = parse_env("VMC_SERIAL_BAUDRATE") {
            self.serial_baudrate = v;
        }
        if let Some(v) = parse_env("VMC_SERIAL_TIMEOUT_MS") {
            self.serial_timeout_ms = v;
        }
        if let Some(v) = parse_env("VMC_COMMAND_TIMEOUT_MS") {
            self.vmc_command_timeout_ms = v;
        }
        if let Some(v) = parse_env("VMC_MAX_RETRIES") {
            self.vmc_max_retries = v;
        }
        if let Some(v) = parse_env("VMC_POLL_INTERVAL_MS") {
            self.vmc_poll_interval_ms = v;
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.serial_baudrate, 57600);
        assert_eq!(config.vmc_command_timeout_ms, 1000);
        assert_eq!(config.vmc_max_retries, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/vmc-config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_values_are_read_and_overridden_by_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"serial_port":"/dev/ttyS0","serial_baudrate":57600,"serial_timeout_ms":100,"vmc_command_timeout_ms":1000,"vmc_max_retries":5,"vmc_poll_interval_ms":200}}"#).unwrap();

        std::env::set_var("VMC_MAX_RETRIES", "9");
        let config = Config::load(file.path()).unwrap();
        std::env::remove_var("VMC_MAX_RETRIES");

        assert_eq!(config.serial_port, "/dev/ttyS0");
        assert_eq!(config.vmc_max_retries, 9);
    }
}
