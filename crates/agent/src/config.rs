//! Agent configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! `FATIGUE_AGENT_<SECTION>__<KEY>` environment variables.

use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context};
use cloud_sync::CloudConfig;
use config::{Config, Environment, File};
use dms::{DriverIdentity, FatigueConfig};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "FATIGUE_AGENT";

/// Send cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    /// Minimum spacing between sends while a fatigue condition is active
    pub alert_interval_ms: u64,
    /// Minimum spacing between sends otherwise (also the keepalive period)
    pub normal_interval_ms: u64,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            alert_interval_ms: 5_000,
            normal_interval_ms: 30_000,
        }
    }
}

impl SendConfig {
    pub fn alert_interval(&self) -> Duration {
        Duration::from_millis(self.alert_interval_ms)
    }

    pub fn normal_interval(&self) -> Duration {
        Duration::from_millis(self.normal_interval_ms)
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Complete agent configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub identity: DriverIdentity,
    pub fatigue: FatigueConfig,
    pub cloud: CloudConfig,
    pub send: SendConfig,
    pub logging: LoggingConfig,
}

impl AgentConfig {
    /// Load and validate
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AgentConfig = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.fatigue.validate()?;

        ensure!(!self.identity.driver_id.is_empty(), "identity.driver_id is empty");
        ensure!(!self.identity.vehicle_id.is_empty(), "identity.vehicle_id is empty");

        let cloud = &self.cloud;
        ensure!(!cloud.host.is_empty(), "cloud.host is empty");
        ensure!(cloud.port != 0, "cloud.port must be non-zero");
        ensure!(cloud.path.starts_with('/'), "cloud.path must start with '/'");
        ensure!(!cloud.destination.is_empty(), "cloud.destination is empty");
        ensure!(cloud.connect_timeout_ms > 0, "cloud.connect_timeout_ms must be positive");
        ensure!(cloud.backoff_initial_ms > 0, "cloud.backoff_initial_ms must be positive");
        ensure!(
            cloud.backoff_max_ms >= cloud.backoff_initial_ms,
            "cloud.backoff_max_ms is below cloud.backoff_initial_ms"
        );

        ensure!(self.send.alert_interval_ms > 0, "send.alert_interval_ms must be positive");
        ensure!(
            self.send.normal_interval_ms > 0,
            "send.normal_interval_ms must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file() -> NamedTempFile {
        tempfile::Builder::new().suffix(".toml").tempfile().unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.identity.driver_id, "DEFAULT_DRIVER");
        assert_eq!(config.send.alert_interval(), Duration::from_secs(5));
        assert_eq!(config.cloud.port, 8080);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
[identity]
driver_id = "D-104"
vehicle_id = "BUS-7"

[fatigue]
ear_threshold = 0.21
fps = 15

[cloud]
host = "collector.fleet.local"
fallback_hosts = ["10.20.0.5"]

[send]
alert_interval_ms = 2000
"#
        )
        .unwrap();

        let config = AgentConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.identity.driver_id, "D-104");
        assert_eq!(config.fatigue.ear_threshold, 0.21);
        assert_eq!(config.fatigue.fps, 15);
        // Untouched keys keep their defaults
        assert_eq!(config.fatigue.mar_threshold, 0.65);
        assert_eq!(config.cloud.host, "collector.fleet.local");
        assert_eq!(config.cloud.candidates(), vec!["collector.fleet.local", "10.20.0.5"]);
        assert_eq!(config.send.alert_interval_ms, 2000);
        assert_eq!(config.send.normal_interval_ms, 30_000);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = toml_file();
        writeln!(file, "[fatigue]\nfps = 0").unwrap();
        assert!(AgentConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AgentConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let mut config = AgentConfig::default();
        config.cloud.backoff_max_ms = 10;
        assert!(config.validate().is_err());
    }
}
