//! Configuration management for Eos
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable
//! overrides of the gateway credentials.

use crate::error::{EosError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Home Assistant gateway connection configuration
    pub gateway: GatewayConfig,

    /// Charger entities and current limits
    pub charger: ChargerConfig,

    /// Safety thresholds and timing windows for the decision ladder
    pub safety: SafetyConfig,

    /// PID tuning gains
    pub pid: PidConfig,

    /// Day-ahead price polling configuration
    pub prices: PricesConfig,

    /// Notification delivery configuration
    pub notifications: NotifyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Home Assistant gateway connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the Home Assistant instance (e.g. http://homeassistant.local:8123)
    pub base_url: String,

    /// Long-lived access token
    pub access_token: String,

    /// Interval between entity state polls in milliseconds
    pub poll_interval_ms: u64,

    /// HTTP request timeout in seconds
    pub request_timeout_seconds: u64,
}

/// Charger entities and current limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargerConfig {
    /// Numeric control point for the requested charging current
    pub current_entity: String,

    /// Switch entity for the charging circuit
    pub switch_entity: String,

    /// Connector/vehicle status sensor
    pub status_entity: String,

    /// Per-phase current sensors
    pub phase_entities: Vec<String>,

    /// Optional sensor reporting the vehicle's actually-measured total draw
    pub actual_draw_entity: Option<String>,

    /// Number of supply phases the actual-draw sensor sums over
    pub phase_count: u32,

    /// Minimum settable charging current in amperes
    pub minimum_amps: f64,

    /// Maximum settable charging current in amperes
    pub maximum_amps: f64,

    /// Whether charging is considered enabled at startup
    #[serde(default = "default_true")]
    pub start_enabled: bool,
}

/// Safety thresholds and timing windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Sustained per-phase current the main fuse tolerates
    pub fuse_setpoint_amps: f64,

    /// Spare capacity required below the fuse setpoint before restarting
    pub restart_headroom_amps: f64,

    /// Margin above the fuse setpoint reserved for the hard safety override
    pub hard_safety_margin_amps: f64,

    /// Minimum seconds between hard safety reactions
    pub hard_safety_debounce_seconds: u64,

    /// Seconds of sustained overcurrent at minimum current before an emergency stop
    pub emergency_grace_seconds: u64,

    /// Seconds between regular decision cycles of the optimization layer
    pub decision_interval_seconds: u64,

    /// Seconds after a hard safety event during which the PID may not act
    pub lockout_seconds: u64,
}

/// PID tuning gains
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    /// Proportional gain
    pub kp: f64,

    /// Integral gain
    pub ki: f64,

    /// Derivative gain
    pub kd: f64,
}

/// Day-ahead price polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricesConfig {
    /// Whether price polling is enabled
    pub enabled: bool,

    /// Nordpool bidding area (e.g. SE2)
    pub area: String,

    /// Price currency (e.g. SEK, EUR)
    pub currency: String,

    /// Minutes between price update polls
    pub poll_interval_minutes: u64,
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Whether notifications are sent at all
    pub enabled: bool,

    /// Target notify service (the device name under the notify domain)
    pub device: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://homeassistant.local:8123".to_string(),
            access_token: String::new(),
            poll_interval_ms: 1000,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            current_entity: "number.ev_charger_charging_current".to_string(),
            switch_entity: "switch.ev_charger".to_string(),
            status_entity: "sensor.ev_charger_status".to_string(),
            phase_entities: vec![
                "sensor.momentary_current_phase_1".to_string(),
                "sensor.momentary_current_phase_2".to_string(),
                "sensor.momentary_current_phase_3".to_string(),
            ],
            actual_draw_entity: None,
            phase_count: 3,
            minimum_amps: 6.0,
            maximum_amps: 16.0,
            start_enabled: true,
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            fuse_setpoint_amps: 20.0,
            restart_headroom_amps: 8.0,
            hard_safety_margin_amps: 2.0,
            hard_safety_debounce_seconds: 5,
            emergency_grace_seconds: 10,
            decision_interval_seconds: 20,
            lockout_seconds: 60,
        }
    }
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.4,
            ki: 0.01,
            kd: 0.05,
        }
    }
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            area: "SE2".to_string(),
            currency: "SEK".to_string(),
            poll_interval_minutes: 10,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/eos.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            charger: ChargerConfig::default(),
            safety: SafetyConfig::default(),
            pid: PidConfig::default(),
            prices: PricesConfig::default(),
            notifications: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations with env overrides
    pub fn load() -> Result<Self> {
        let default_paths = ["eos_config.yaml", "/data/eos_config.yaml", "/etc/eos/config.yaml"];

        let mut config = Config::default();
        for path in &default_paths {
            if Path::new(path).exists() {
                config = Self::from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides for the gateway credentials
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("EOS_GATEWAY_URL") {
            if !url.is_empty() {
                self.gateway.base_url = url;
            }
        }
        if let Ok(token) = std::env::var("EOS_GATEWAY_TOKEN") {
            if !token.is_empty() {
                self.gateway.access_token = token;
            }
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.gateway.base_url.is_empty() {
            return Err(EosError::validation(
                "gateway.base_url",
                "Gateway URL cannot be empty",
            ));
        }

        if self.gateway.poll_interval_ms == 0 {
            return Err(EosError::validation(
                "gateway.poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.charger.phase_entities.is_empty() {
            return Err(EosError::validation(
                "charger.phase_entities",
                "At least one phase sensor is required",
            ));
        }

        if self.charger.minimum_amps <= 0.0 {
            return Err(EosError::validation(
                "charger.minimum_amps",
                "Must be positive",
            ));
        }

        if self.charger.maximum_amps < self.charger.minimum_amps {
            return Err(EosError::validation(
                "charger.maximum_amps",
                "Must be at least minimum_amps",
            ));
        }

        if self.charger.phase_count == 0 {
            return Err(EosError::validation(
                "charger.phase_count",
                "Must be greater than 0",
            ));
        }

        if self.safety.fuse_setpoint_amps <= 0.0 {
            return Err(EosError::validation(
                "safety.fuse_setpoint_amps",
                "Must be positive",
            ));
        }

        if self.safety.decision_interval_seconds == 0 {
            return Err(EosError::validation(
                "safety.decision_interval_seconds",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.charger.minimum_amps, 6.0);
        assert_eq!(config.charger.maximum_amps, 16.0);
        assert_eq!(config.safety.fuse_setpoint_amps, 20.0);
        assert_eq!(config.gateway.poll_interval_ms, 1000);
        assert!(config.charger.start_enabled);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        // Empty gateway URL
        config.gateway.base_url = String::new();
        assert!(config.validate().is_err());

        // Reset and test inverted amp range
        config = Config::default();
        config.charger.maximum_amps = 4.0;
        assert!(config.validate().is_err());

        // Non-positive fuse setpoint
        config = Config::default();
        config.safety.fuse_setpoint_amps = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            config.charger.minimum_amps,
            deserialized.charger.minimum_amps
        );
        assert_eq!(config.prices.area, deserialized.prices.area);
    }
}
