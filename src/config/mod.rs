//! Configuration module for feeder-tuner.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `FEEDER_TUNER_CONFIG` environment variable (explicit path)
//! 2. `./feeder_tuner.toml` (current directory)
//! 3. `feeder_tuner.toml` in the platform config directory
//!    (`~/.config/feeder-tuner/` on Linux)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! - `FEEDER_TUNER_SERIAL_PORT`, `FEEDER_TUNER_SERIAL_BAUD_RATE`,
//!   `FEEDER_TUNER_SERIAL_READ_TIMEOUT_MS`
//! - `FEEDER_TUNER_LOG_LEVEL`, `FEEDER_TUNER_LOG_FORMAT`
//! - `FEEDER_TUNER_FEEDERS_FILE`, `FEEDER_TUNER_CONTROLLER_FILE`
//!
//! # Example
//!
//! ```rust,no_run
//! use feeder_tuner::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Feeders file: {}", config.storage.feeders_file.display());
//! # Ok::<(), feeder_tuner::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, ControllerConfig, LogFormat, LoggingConfig, SerialConfig, StorageConfig};
