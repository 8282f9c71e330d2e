//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files, and the
//! runtime [`GlobalConfig`] that the driver's Config operation reads and
//! updates.

use serde::de::Error;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{JoystickError, Result};

/// Smallest accepted poll interval in centiseconds
pub const MIN_POLL_INTERVAL_CS: u32 = 2;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which game port implementation backs the driver
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Linux `/dev/port` byte I/O
    DevPort,
    /// In-process simulated sticks
    Simulated,
}

/// Game port hardware configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HardwareConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,

    /// Port address as a hex string; `GAMEPORT_ADDRESS` takes precedence
    #[serde(default)]
    pub port_address: Option<String>,

    #[serde(default = "default_counter_modulus")]
    pub counter_modulus: u32,
}

/// Acquisition and conditioning configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionConfig {
    #[serde(default = "default_enabled")]
    pub smoothing: bool,

    #[serde(default = "default_enabled")]
    pub centre_zones: bool,

    #[serde(default = "default_enabled")]
    pub end_zones: bool,

    #[serde(default = "default_tolerance_ticks")]
    pub tolerance_ticks: u32,

    #[serde(default = "default_timeout_ticks")]
    pub timeout_ticks: u32,
}

/// Background polling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_cs")]
    pub interval_cs: u32,

    #[serde(default = "default_monitor_interval_cs")]
    pub monitor_interval_cs: u32,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; stdout only when absent
    #[serde(default)]
    pub file: Option<String>,
}

// Default value functions
fn default_backend() -> Backend { Backend::DevPort }
fn default_counter_modulus() -> u32 { 20000 }

fn default_enabled() -> bool { true }
fn default_tolerance_ticks() -> u32 { 30 }
fn default_timeout_ticks() -> u32 { 2000 }

fn default_poll_interval_cs() -> u32 { 7 }
fn default_monitor_interval_cs() -> u32 { 1000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            port_address: None,
            counter_modulus: default_counter_modulus(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            smoothing: default_enabled(),
            centre_zones: default_enabled(),
            end_zones: default_enabled(),
            tolerance_ticks: default_tolerance_ticks(),
            timeout_ticks: default_timeout_ticks(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_cs: default_poll_interval_cs(),
            monitor_interval_cs: default_monitor_interval_cs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gameport_joystick::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.hardware.counter_modulus < 2 {
            return Err(JoystickError::Config(toml::de::Error::custom(
                "counter_modulus must be at least 2",
            )));
        }

        if self.acquisition.timeout_ticks == 0
            || self.acquisition.timeout_ticks >= self.hardware.counter_modulus
        {
            return Err(JoystickError::Config(toml::de::Error::custom(
                "timeout_ticks must be between 1 and counter_modulus - 1",
            )));
        }

        if self.polling.interval_cs < MIN_POLL_INTERVAL_CS || self.polling.interval_cs > 6000 {
            return Err(JoystickError::Config(toml::de::Error::custom(
                "interval_cs must be between 2 and 6000",
            )));
        }

        if self.polling.monitor_interval_cs == 0 || self.polling.monitor_interval_cs > 360_000 {
            return Err(JoystickError::Config(toml::de::Error::custom(
                "monitor_interval_cs must be between 1 and 360000",
            )));
        }

        if let Some(address) = &self.hardware.port_address {
            if address.trim().is_empty() {
                return Err(JoystickError::Config(toml::de::Error::custom(
                    "port_address cannot be empty when given",
                )));
            }
        }

        if self.logging.level.is_empty() {
            return Err(JoystickError::Config(toml::de::Error::custom(
                "logging level cannot be empty",
            )));
        }

        Ok(())
    }

    /// Runtime configuration seeded from the `[acquisition]` and `[polling]` sections.
    #[must_use]
    pub fn global(&self) -> GlobalConfig {
        GlobalConfig {
            smoothing: self.acquisition.smoothing,
            ctr_zones: self.acquisition.centre_zones,
            end_zones: self.acquisition.end_zones,
            tolerance: self.acquisition.tolerance_ticks,
            timeout: self.acquisition.timeout_ticks,
            poll_interval_cs: self.polling.interval_cs,
        }
    }
}

/// Driver-wide settings shared by every stick and axis.
///
/// `tolerance` and `timeout` are in half-microsecond counter ticks,
/// `poll_interval_cs` in centiseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalConfig {
    pub smoothing: bool,
    pub ctr_zones: bool,
    pub end_zones: bool,
    pub tolerance: u32,
    pub timeout: u32,
    pub poll_interval_cs: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            smoothing: default_enabled(),
            ctr_zones: default_enabled(),
            end_zones: default_enabled(),
            tolerance: default_tolerance_ticks(),
            timeout: default_timeout_ticks(),
            poll_interval_cs: default_poll_interval_cs(),
        }
    }
}

/// Argument to the Config operation: only the supplied fields change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub smoothing: Option<bool>,
    pub ctr_zones: Option<bool>,
    pub end_zones: Option<bool>,
    pub tolerance: Option<u32>,
    pub timeout: Option<u32>,
    pub poll_interval_cs: Option<u32>,
}

impl ConfigUpdate {
    /// True when no field is supplied (the operation then only reports).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// What an applied [`ConfigUpdate`] actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    /// A centre or end zone flag flipped; coefficients must be recomputed.
    pub zones: bool,
    /// The poll interval differs from the previous one.
    pub poll_interval: bool,
}

impl GlobalConfig {
    /// Applies an update after validating every supplied field.
    ///
    /// Nothing is modified when validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::ConfigSyntax`] for a poll interval below
    /// two centiseconds or a zero timeout.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<ConfigChanges> {
        if let Some(interval) = update.poll_interval_cs {
            if interval < MIN_POLL_INTERVAL_CS {
                return Err(JoystickError::ConfigSyntax(format!(
                    "poll interval {} cs is below the minimum of {} cs",
                    interval, MIN_POLL_INTERVAL_CS
                )));
            }
        }
        if update.timeout == Some(0) {
            return Err(JoystickError::ConfigSyntax(
                "timeout must be at least one tick".to_string(),
            ));
        }

        let mut changes = ConfigChanges::default();

        if let Some(smoothing) = update.smoothing {
            self.smoothing = smoothing;
        }
        if let Some(ctr_zones) = update.ctr_zones {
            changes.zones |= ctr_zones != self.ctr_zones;
            self.ctr_zones = ctr_zones;
        }
        if let Some(end_zones) = update.end_zones {
            changes.zones |= end_zones != self.end_zones;
            self.end_zones = end_zones;
        }
        if let Some(tolerance) = update.tolerance {
            self.tolerance = tolerance;
        }
        if let Some(timeout) = update.timeout {
            self.timeout = timeout;
        }
        if let Some(interval) = update.poll_interval_cs {
            changes.poll_interval = interval != self.poll_interval_cs;
            self.poll_interval_cs = interval;
        }

        Ok(changes)
    }
}

impl fmt::Display for GlobalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn switch(on: bool, name: &str) -> String {
            if on {
                format!("-{}", name)
            } else {
                format!("-no{}", name)
            }
        }

        write!(
            f,
            "Joystick driver configuration: {} {} {} -tolerance {} -timeout {} -poll {}",
            switch(self.smoothing, "smooth"),
            switch(self.ctr_zones, "ctrzone"),
            switch(self.end_zones, "endzone"),
            self.tolerance,
            self.timeout,
            self.poll_interval_cs
        )
    }
}
