//! Top-level application error and exit-code mapping.

use crate::angle::AngleParseError;
use crate::board::AddressError;
use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::protocol::{ConnectionError, ProtocolError};
use crate::registry::RegistryError;
use crate::topology::TopologyError;
use thiserror::Error;

/// Exit code for a clean run.
pub const EXIT_OK: u8 = 0;
/// Exit code for a command that failed at runtime.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for unusable configuration or topology files.
pub const EXIT_CONFIG: u8 = 2;

/// Unified application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid angle: {0}")]
    Angle(#[from] AngleParseError),

    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("no serial port given; pass --port, set serial.port, or add port_name to the controller file")]
    NoPort,

    #[error("no board position selected")]
    NoSelection,

    #[error("no feeder with id '{0}' in the registry")]
    UnknownFeeder(String),

    #[error("servo angle at {0} is unknown; move it before storing an angle")]
    UnknownAngle(String),

    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl AppError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Topology(_) | Self::NoPort => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }

    /// Short error family name, shown alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Logging(_) => "LoggingError",
            Self::Topology(_) => "TopologyError",
            Self::Connection(_) => "ConnectionError",
            Self::Protocol(e) => e.kind(),
            Self::Registry(RegistryError::DuplicateId(_)) => "DuplicateID",
            Self::Registry(RegistryError::NotFound(_)) => "NotFound",
            Self::Registry(_) => "RegistryError",
            Self::Angle(_) => "ParseError",
            Self::Address(_) => "InvalidAddress",
            Self::NoPort => "ConfigError",
            Self::NoSelection | Self::UnknownFeeder(_) | Self::UnknownAngle(_) => "SessionError",
            Self::Io(_) => "IOError",
            Self::Output(_) => "IOError",
        }
    }
}

/// Convenient result alias for application-level operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes() {
        let topology = AppError::from(TopologyError::NotFound(PathBuf::from("feeder_controller.json")));
        assert_eq!(topology.exit_code(), EXIT_CONFIG);

        let config = AppError::from(ConfigError::invalid("serial.baud_rate", "bad"));
        assert_eq!(config.exit_code(), EXIT_CONFIG);

        let protocol = AppError::from(ProtocolError::NotConnected);
        assert_eq!(protocol.exit_code(), EXIT_FAILURE);
        assert_eq!(AppError::NoSelection.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_kind_and_message_pass_through() {
        let err = AppError::from(ProtocolError::Rejected {
            command: "M603 N000 A90".into(),
            message: "error: servo fault".into(),
        });
        assert_eq!(err.kind(), "Rejected");
        assert_eq!(err.to_string(), "controller rejected 'M603 N000 A90': error: servo fault");

        let err = AppError::from(RegistryError::DuplicateId("F1".into()));
        assert_eq!(err.kind(), "DuplicateID");
    }
}
