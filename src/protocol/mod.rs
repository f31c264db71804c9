//! M-code protocol: typed commands, reply parsers, and the engine that
//! drives one controller over a [`SerialPortAdapter`](crate::port::SerialPortAdapter).

pub mod command;
pub mod engine;
pub mod error;
pub mod response;

pub use command::{Command, ResponseKind, SUPPORTED_BAUD_RATES};
pub use engine::{ControllerSettings, FeederController, ResponseHandler, DEFAULT_MODEL};
pub use error::{ConnectionError, ProtocolError};
pub use response::{BoardDump, DumpAnomaly, FirmwareVersion, ParsedResponse};
