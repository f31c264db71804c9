//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use crate::protocol::SUPPORTED_BAUD_RATES;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "FEEDER_TUNER";

/// Config file name
const CONFIG_FILE_NAME: &str = "feeder_tuner.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "FEEDER_TUNER_CONFIG";

const APPLICATION: &str = "feeder-tuner";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `FEEDER_TUNER_CONFIG` environment variable (explicit path)
    /// 2. `./feeder_tuner.toml` (current directory)
    /// 3. the platform config directory for `feeder-tuner`
    /// 4. Built-in defaults (no file required)
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file, no env).
    pub fn with_defaults() -> Self {
        Self {
            config_path: None,
            config: Config::default(),
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// The effective configuration as TOML.
    pub fn render(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(&self.config)?)
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // An explicit path is honored even if missing, so the read error surfaces.
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> Option<(String, String)> {
    let name = format!("{}_{}", ENV_PREFIX, key);
    std::env::var(&name).ok().map(|value| (name, value))
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `FEEDER_TUNER_<SECTION>_<KEY>`, e.g.
/// `FEEDER_TUNER_SERIAL_PORT=/dev/ttyUSB0`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some((_, val)) = env_var("SERIAL_PORT") {
        config.serial.port = Some(val);
    }
    if let Some((var, val)) = env_var("SERIAL_BAUD_RATE") {
        config.serial.baud_rate = val
            .parse()
            .map_err(|_| ConfigError::bad_env(var, "not a number"))?;
    }
    if let Some((var, val)) = env_var("SERIAL_READ_TIMEOUT_MS") {
        config.serial.read_timeout_ms = val
            .parse()
            .map_err(|_| ConfigError::bad_env(var, "not a number of milliseconds"))?;
    }

    if let Some((_, val)) = env_var("LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Some((var, val)) = env_var("LOG_FORMAT") {
        config.logging.format = match val.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => return Err(ConfigError::bad_env(var, "expected json, pretty or compact")),
        };
    }

    if let Some((_, val)) = env_var("FEEDERS_FILE") {
        config.storage.feeders_file = PathBuf::from(val);
    }
    if let Some((_, val)) = env_var("CONTROLLER_FILE") {
        config.storage.controller_file = PathBuf::from(val);
    }

    Ok(())
}

fn validate(config: &Config) -> ConfigResult<()> {
    if !SUPPORTED_BAUD_RATES.contains(&config.serial.baud_rate) {
        return Err(ConfigError::invalid(
            "serial.baud_rate",
            format!("{} is not one of {:?}", config.serial.baud_rate, SUPPORTED_BAUD_RATES),
        ));
    }
    if config.serial.read_timeout_ms == 0 {
        return Err(ConfigError::invalid("serial.read_timeout_ms", "must be greater than zero"));
    }
    if !(1..=99).contains(&config.controller.positions_per_board) {
        return Err(ConfigError::invalid(
            "controller.positions_per_board",
            "must be between 1 and 99",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 19_200);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeder_tuner.toml");
        std::fs::write(&path, "[serial]\nport = \"/dev/ttyUSB0\"\n").unwrap();

        env::set_var("FEEDER_TUNER_SERIAL_PORT", "/dev/ttyACM3");
        env::set_var("FEEDER_TUNER_SERIAL_READ_TIMEOUT_MS", "250");
        let loader = ConfigLoader::load_from(&path);
        env::remove_var("FEEDER_TUNER_SERIAL_PORT");
        env::remove_var("FEEDER_TUNER_SERIAL_READ_TIMEOUT_MS");

        let config = loader.unwrap().into_config();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM3"));
        assert_eq!(config.serial.read_timeout_ms, 250);
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeder_tuner.toml");
        std::fs::write(&path, "").unwrap();

        env::set_var("FEEDER_TUNER_SERIAL_BAUD_RATE", "fast");
        let result = ConfigLoader::load_from(&path);
        env::remove_var("FEEDER_TUNER_SERIAL_BAUD_RATE");

        assert!(matches!(result, Err(ConfigError::BadEnv { var, .. }) if var == "FEEDER_TUNER_SERIAL_BAUD_RATE"));
    }

    #[test]
    #[serial]
    fn test_explicit_path_env_must_exist() {
        env::set_var(CONFIG_PATH_ENV, "/nonexistent/feeder_tuner.toml");
        let result = ConfigLoader::load();
        env::remove_var(CONFIG_PATH_ENV);

        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeder_tuner.toml");
        std::fs::write(&path, "[serial\nport = ").unwrap();

        assert!(matches!(ConfigLoader::load_from(&path), Err(ConfigError::Malformed { .. })));
    }

    #[test]
    #[serial]
    fn test_unsupported_baud_rate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeder_tuner.toml");
        std::fs::write(&path, "[serial]\nbaud_rate = 12345\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from(&path),
            Err(ConfigError::Invalid { key, .. }) if key == "serial.baud_rate"
        ));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("feeder_tuner.toml");

        let mut loader = ConfigLoader::with_defaults();
        loader.config.serial.port = Some("/dev/ttyUSB2".into());
        loader.save_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let reloaded: Config = toml::from_str(&content).unwrap();
        assert_eq!(reloaded, loader.config);
    }
}
