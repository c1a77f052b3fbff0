//! TOML configuration for all bus roles.
//!
//! Every section has working defaults so the binary runs against a local
//! broker without any file at all; a partial file overrides only what it
//! names.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::bus::{BrokerConfig, CommandConfig, MonitorConfig, PublisherConfig};
use crate::sensor::EmitterConfig;
use crate::topic::NAMESPACE;

pub const DEFAULT_CONFIG_PATH: &str = "iotbus.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Root of the topic namespace all roles operate under.
    pub namespace: String,
    pub broker: BrokerConfig,
    pub publisher: PublisherConfig,
    pub monitor: MonitorConfig,
    pub command: CommandConfig,
    pub emitter: EmitterConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            namespace: NAMESPACE.to_string(),
            broker: BrokerConfig::default(),
            publisher: PublisherConfig::default(),
            monitor: MonitorConfig::default(),
            command: CommandConfig::default(),
            emitter: EmitterConfig::default(),
        }
    }
}

impl BusConfig {
    /// Loads the file at `path`, falling back to defaults when the file
    /// simply does not exist.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            info!(path, "no config file, using defaults");
            return Ok(BusConfig::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: BusConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        debug!(path, "config loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorKind;

    #[test]
    fn defaults_target_local_broker() {
        let config = BusConfig::default();
        assert_eq!(config.namespace, "system_iot");
        assert_eq!(config.broker.host, "127.0.0.1");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.publisher.device_id, "esp32_sim");
        assert_eq!(config.monitor.client_id, "pc_monitor_client");
        assert_eq!(config.command.device_id, "esp32");
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config: BusConfig = toml::from_str(
            r#"
            [broker]
            host = "10.85.58.210"

            [publisher]
            device_id = "esp32"
            sensors = ["battery"]
            period_secs = 300
            "#,
        )
        .unwrap();
        assert_eq!(config.broker.host, "10.85.58.210");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.publisher.device_id, "esp32");
        assert_eq!(config.publisher.sensors, vec![SensorKind::Battery]);
        assert_eq!(config.publisher.period_secs, 300);
        assert_eq!(config.namespace, "system_iot");
    }

    #[test]
    fn sensor_list_uses_wire_spelling() {
        let config: BusConfig = toml::from_str(
            r#"
            [publisher]
            sensors = ["gps", "battery", "acc"]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.publisher.sensors,
            vec![SensorKind::Gps, SensorKind::Battery, SensorKind::Acc]
        );
    }
}
