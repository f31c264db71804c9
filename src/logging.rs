//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use crate::config::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Filter directive for the given verbosity, or the configured level when
/// no `-v` flags were passed.
pub fn directive_for(config: &LoggingConfig, verbosity: u8) -> String {
    match verbosity {
        0 => config.level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over both the config file and `-v`. Calling this twice is
/// harmless.
pub fn init(config: &LoggingConfig, verbosity: u8) -> Result<(), LoggingError> {
    let directive = directive_for(config, verbosity);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directive).map_err(|source| LoggingError::Filter {
            directive: directive.clone(),
            source,
        })?,
    };

    let result = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().pretty().with_writer(std::io::stderr).with_filter(filter))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr).with_filter(filter))
            .try_init(),
    };

    result.or_else(|e| {
        if e.to_string().contains("global default trace dispatcher has already been set") {
            Ok(())
        } else {
            Err(LoggingError::Init(e.to_string()))
        }
    })
}
