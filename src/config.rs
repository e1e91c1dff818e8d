//! Session configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! line_timeout_ms = 4000
//! max_followup_attempts = 3
//! ```

use crate::constants::*;
use crate::error::{ModemError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a modem session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Serial port; auto-selected when absent
    pub port: Option<String>,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Timeout for one line read (milliseconds)
    pub line_timeout_ms: u64,
    /// Empty reads tolerated while waiting for a remote response
    pub max_followup_attempts: u32,
    /// Pause after each empty follow-up read (milliseconds)
    pub followup_poll_interval_ms: u64,
    /// Salinity used for sound velocity until the device reports one (PSU)
    pub salinity_psu: f64,
    /// Local modem depth (meters)
    pub depth_m: f64,
    /// Depth separation to the remote station (meters)
    pub depth_difference_m: f64,
    /// Communication log file
    pub log_path: PathBuf,
    /// Metrics CSV file
    pub csv_path: PathBuf,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: BAUD_RATE,
            line_timeout_ms: LINE_TIMEOUT_MS,
            max_followup_attempts: MAX_FOLLOWUP_ATTEMPTS,
            followup_poll_interval_ms: FOLLOWUP_POLL_INTERVAL_MS,
            salinity_psu: DEFAULT_SALINITY,
            depth_m: DEFAULT_DEPTH,
            depth_difference_m: 0.0,
            log_path: PathBuf::from(LOG_FILE),
            csv_path: PathBuf::from(CSV_FILE),
        }
    }
}

impl ModemConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ModemConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn line_timeout(&self) -> Duration {
        Duration::from_millis(self.line_timeout_ms)
    }

    pub fn followup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.followup_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(ModemError::Config("baud_rate must be non-zero".to_string()));
        }
        if self.line_timeout_ms == 0 {
            return Err(ModemError::Config(
                "line_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.max_followup_attempts == 0 {
            return Err(ModemError::Config(
                "max_followup_attempts must be non-zero".to_string(),
            ));
        }
        if !self.salinity_psu.is_finite() || self.salinity_psu < 0.0 {
            return Err(ModemError::Config(format!(
                "salinity_psu = {}",
                self.salinity_psu
            )));
        }
        if !self.depth_m.is_finite() || !self.depth_difference_m.is_finite() {
            return Err(ModemError::Config("depths must be finite".to_string()));
        }
        Ok(())
    }
}
