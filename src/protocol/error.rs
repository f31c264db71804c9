//! Protocol-level error types.

use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// The serial port could not be opened. Fatal to engine construction.
#[derive(Debug, Error)]
#[error("failed to open feeder controller on '{port_name}': {source}")]
pub struct ConnectionError {
    pub port_name: String,
    #[source]
    pub source: PortError,
}

/// Errors from a single command/response exchange.
///
/// None of these change the board/position model: state is only updated
/// after the controller confirms a command.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("serial port is not open")]
    NotConnected,

    #[error("no response to '{command}' within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("unrecognized response to '{command}': {response:?}")]
    Unrecognized { command: String, response: String },

    #[error("controller rejected '{command}': {message}")]
    Rejected { command: String, message: String },

    #[error("no firmware/hardware version in response: {response:?}")]
    NoVersionInfo { response: String },

    #[error("invalid response handler for command {0:?}")]
    InvalidHandler(String),

    #[error("no position {position} on board {board}")]
    InvalidAddress { board: u8, position: u8 },

    #[error("no board {0} in this controller")]
    InvalidBoard(u8),

    #[error("unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    #[error("unexpected {kind} response to '{command}'")]
    UnexpectedResponse { command: String, kind: &'static str },

    #[error("transport failure during '{command}': {source}")]
    Transport {
        command: String,
        #[source]
        source: PortError,
    },
}

impl ProtocolError {
    /// Short name of the error family, for user-facing reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "NotConnected",
            Self::Timeout { .. } => "Timeout",
            Self::Unrecognized { .. } => "Unrecognized",
            Self::Rejected { .. } => "Rejected",
            Self::NoVersionInfo { .. } => "NoVersionInfo",
            Self::InvalidHandler(_) => "InvalidHandler",
            Self::InvalidAddress { .. } | Self::InvalidBoard(_) => "InvalidAddress",
            Self::UnsupportedBaudRate(_) => "UnsupportedBaudRate",
            Self::UnexpectedResponse { .. } => "UnexpectedResponse",
            Self::Transport { .. } => "Transport",
        }
    }

    /// Whether retrying the same command could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}
