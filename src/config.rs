//! Application configuration
//!
//! Loaded from a TOML file (every section optional), then adjusted by
//! `OEE_*` environment variables.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [monitoring]
//! check_interval_secs = 30
//! detection_threshold_minutes = 5
//!
//! [oee]
//! target_rate_per_minute = 42.0
//!
//! [retry.device]
//! max_attempts = 5
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::stoppage::DetectorSettings;
use crate::domain::oee::OeeCalculationConfig;
use crate::infrastructure::counters::SimulatorSettings;
use crate::shared::errors::{DomainError, DomainResult};
use crate::shared::retry::RetrySettings;

const APP_DIR: &str = "oee-monitor";
const CONFIG_FILE: &str = "config.toml";

/// `~/.config/oee-monitor/config.toml`, or `./config.toml` when no
/// config directory is known.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub monitoring: MonitoringConfig,
    pub oee: OeeCalculationConfig,
    pub retry: RetryConfig,
    pub metrics: MetricsConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `oee_monitor=debug`
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub detection_threshold_minutes: u32,
    /// Defaults to the detection threshold
    pub classification_threshold_minutes: Option<u32>,
    pub rate_lookback_minutes: u32,
    pub activity_lookback_hours: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        let detector = DetectorSettings::default();
        Self {
            enabled: true,
            check_interval_secs: 60,
            detection_threshold_minutes: detector.detection_threshold_minutes,
            classification_threshold_minutes: None,
            rate_lookback_minutes: detector.rate_lookback_minutes,
            activity_lookback_hours: detector.activity_lookback_hours,
        }
    }
}

impl MonitoringConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            detection_threshold_minutes: self.detection_threshold_minutes,
            classification_threshold_minutes: self
                .classification_threshold_minutes
                .unwrap_or(self.detection_threshold_minutes),
            rate_lookback_minutes: self.rate_lookback_minutes,
            activity_lookback_hours: self.activity_lookback_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Counter store reads
    pub device: RetrySettings,
    /// Notification publishing
    pub network: RetrySettings,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            device: RetrySettings::default(),
            network: RetrySettings::network(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "0.0.0.0:9100".to_string(),
        }
    }
}

impl MetricsConfig {
    pub fn socket_addr(&self) -> DomainResult<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            DomainError::Config(format!(
                "metrics.listen_addr '{}' is not a socket address: {}",
                self.listen_addr, e
            ))
        })
    }
}

/// Simulated counter devices, one per line `LINE-01`, `LINE-02`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub lines: u32,
    pub tick_secs: u64,
    pub pieces_per_tick: u64,
    pub reject_probability: f64,
    pub pause_probability: f64,
    pub pause_ticks: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let settings = SimulatorSettings::default();
        Self {
            lines: 2,
            tick_secs: settings.tick.as_secs(),
            pieces_per_tick: settings.pieces_per_tick,
            reject_probability: settings.reject_probability,
            pause_probability: settings.pause_probability,
            pause_ticks: settings.pause_ticks,
        }
    }
}

impl SimulatorConfig {
    /// Device settings wired to the channels the OEE engine reads.
    pub fn settings(&self, oee: &OeeCalculationConfig) -> SimulatorSettings {
        SimulatorSettings {
            tick: Duration::from_secs(self.tick_secs),
            pieces_per_tick: self.pieces_per_tick,
            production_channel: oee.production_channel,
            reject_channel: oee.reject_channel,
            reject_probability: self.reject_probability,
            pause_probability: self.pause_probability,
            pause_ticks: self.pause_ticks,
        }
    }
}

impl AppConfig {
    /// Read `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> DomainResult<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                DomainError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            Self::from_toml_str(&raw)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> DomainResult<Self> {
        toml::from_str(raw).map_err(|e| DomainError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> DomainResult<String> {
        toml::to_string_pretty(self).map_err(|e| DomainError::Config(e.to_string()))
    }

    /// Apply `OEE_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> DomainResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("OEE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("OEE_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(raw) = lookup("OEE_DETECTION_THRESHOLD_MINUTES") {
            self.monitoring.detection_threshold_minutes =
                parse_override("OEE_DETECTION_THRESHOLD_MINUTES", &raw)?;
        }
        if let Some(raw) = lookup("OEE_CHECK_INTERVAL_SECS") {
            self.monitoring.check_interval_secs = parse_override("OEE_CHECK_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("OEE_TARGET_RATE_PER_MINUTE") {
            self.oee.target_rate_per_minute = parse_override("OEE_TARGET_RATE_PER_MINUTE", &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self.logging.format.to_lowercase().as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(DomainError::Config(format!(
                    "logging.format must be 'pretty' or 'json', got '{}'",
                    other
                )))
            }
        }

        let monitoring = &self.monitoring;
        if monitoring.check_interval_secs == 0 {
            return Err(DomainError::Config(
                "monitoring.check_interval_secs must be at least 1".into(),
            ));
        }
        if monitoring.detection_threshold_minutes == 0 {
            return Err(DomainError::Config(
                "monitoring.detection_threshold_minutes must be at least 1".into(),
            ));
        }
        if monitoring.rate_lookback_minutes == 0
            || monitoring.rate_lookback_minutes >= monitoring.detection_threshold_minutes
        {
            return Err(DomainError::Config(format!(
                "monitoring.rate_lookback_minutes must be 1..{}",
                monitoring.detection_threshold_minutes
            )));
        }
        if monitoring.activity_lookback_hours == 0 {
            return Err(DomainError::Config(
                "monitoring.activity_lookback_hours must be at least 1".into(),
            ));
        }

        self.oee.check()?;

        for (name, retry) in [("device", &self.retry.device), ("network", &self.retry.network)] {
            if !(0.0..=1.0).contains(&retry.jitter_factor) {
                return Err(DomainError::Config(format!(
                    "retry.{}.jitter_factor must be within 0..=1",
                    name
                )));
            }
            if retry.base_delay_ms > retry.max_delay_ms {
                return Err(DomainError::Config(format!(
                    "retry.{}.base_delay_ms exceeds max_delay_ms",
                    name
                )));
            }
        }

        if self.metrics.enabled {
            self.metrics.socket_addr()?;
        }

        let simulator = &self.simulator;
        if simulator.tick_secs == 0 {
            return Err(DomainError::Config("simulator.tick_secs must be at least 1".into()));
        }
        for (name, p) in [
            ("reject_probability", simulator.reject_probability),
            ("pause_probability", simulator.pause_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(DomainError::Config(format!(
                    "simulator.{} must be within 0..=1",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn parse_override<T>(key: &str, raw: &str) -> DomainResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| DomainError::Config(format!("{} = '{}': {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retry.device.max_attempts, 3);
        assert_eq!(config.retry.network.base_delay_ms, 500);
        assert_eq!(config.monitoring.detector_settings(), DetectorSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [logging]
            format = "json"

            [monitoring]
            detection_threshold_minutes = 10

            [oee]
            target_rate_per_minute = 42.0

            [retry.device]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.monitoring.detection_threshold_minutes, 10);
        assert_eq!(config.monitoring.check_interval_secs, 60);
        assert_eq!(config.oee.target_rate_per_minute, 42.0);
        assert_eq!(config.oee.reject_channel, 1);
        assert_eq!(config.retry.device.max_attempts, 5);
        assert_eq!(config.retry.device.base_delay_ms, 200);
        assert_eq!(config.monitoring.detector_settings().classification_threshold_minutes, 10);
    }

    #[test]
    fn toml_round_trip() {
        let config = AppConfig::default();
        let parsed = AppConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[monitoring\n"),
            Err(DomainError::Config(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("oee-monitor-missing").join("nope.toml");
        let config = AppConfig::load(&path).unwrap();
        assert!(config.monitoring.enabled);
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("OEE_LOG_LEVEL", "debug"),
            ("OEE_DETECTION_THRESHOLD_MINUTES", "8"),
            ("OEE_CHECK_INTERVAL_SECS", " 15 "),
            ("OEE_TARGET_RATE_PER_MINUTE", "55.5"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.monitoring.detection_threshold_minutes, 8);
        assert_eq!(config.monitoring.check_interval(), Duration::from_secs(15));
        assert_eq!(config.oee.target_rate_per_minute, 55.5);
    }

    #[test]
    fn unparsable_override_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "OEE_CHECK_INTERVAL_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(DomainError::Config(_))));
    }

    #[test]
    fn validation_rejects_inconsistent_settings() {
        let mut config = AppConfig::default();
        config.monitoring.rate_lookback_minutes = 5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.oee.reject_channel = config.oee.production_channel;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.metrics.enabled = true;
        config.metrics.listen_addr = "not-an-address".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retry.network.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn simulator_settings_follow_oee_channels() {
        let mut oee = OeeCalculationConfig::default();
        oee.production_channel = 2;
        oee.reject_channel = 3;
        let settings = SimulatorConfig::default().settings(&oee);
        assert_eq!(settings.production_channel, 2);
        assert_eq!(settings.reject_channel, 3);
        assert_eq!(settings.tick, Duration::from_secs(2));
    }
}
