//! Configuration schema definitions.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the keys
//! it wants to change.

use crate::board::DEFAULT_POSITIONS_PER_BOARD;
use crate::port::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};
use crate::protocol::DEFAULT_MODEL;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub controller: ControllerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Serial link to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name or alias; `None` falls back to the topology file.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Deadline for a complete reply, in milliseconds
    pub read_timeout_ms: u64,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Controller defaults used when the topology file does not say otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub model: String,
    pub positions_per_board: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            positions_per_board: DEFAULT_POSITIONS_PER_BOARD,
        }
    }
}

/// Where the feeder catalog and controller topology live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub feeders_file: PathBuf,
    pub controller_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            feeders_file: PathBuf::from("feeders.json"),
            controller_file: PathBuf::from("feeder_controller.json"),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive: "trace", "debug", "info", "warn", "error", or a
    /// full `EnvFilter` expression
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    /// Multi-line with colors
    Pretty,
    #[default]
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 19_200);
        assert_eq!(config.serial.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.controller.positions_per_board, 13);
        assert_eq!(config.storage.feeders_file, PathBuf::from("feeders.json"));
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("feeders".to_string(), "/dev/ttyACM0".to_string());

        assert_eq!(config.resolve_port("feeders"), "/dev/ttyACM0");
        assert_eq!(config.resolve_port("COM5"), "COM5");
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[storage]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml_str = r#"
            [serial]
            port = "/dev/ttyUSB1"

            [logging]
            format = "json"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.serial.baud_rate, 19_200);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.controller.model, "PandaPlacerSlotFeederv2");
    }
}
