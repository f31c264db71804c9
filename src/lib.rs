//! Feeder Tuner Library
//!
//! Drives a chain of pick-and-place feeder boards over a serial M-code link:
//! the feeder/board/position data model, the command/response protocol
//! engine, and the persisted feeder catalog and controller topology.
//!
//! # Modules
//!
//! - `angle`: normalized servo angles and the shared angle-instruction rule
//! - `feeder`, `board`: the feeder and board/position data model
//! - `registry`: the persisted feeder catalog
//! - `port`: serial transport abstraction (real port and scripted mock)
//! - `protocol`: typed commands, response parsers, and the controller engine
//! - `topology`: the controller topology file
//! - `jog`: keyboard jog state machine
//! - `service`: the tuning session the CLI drives
//! - `config`: configuration management with TOML support
//! - `logging`: tracing subscriber setup
//! - `error`: unified application error

pub mod angle;
pub mod board;
pub mod config;
pub mod error;
pub mod feeder;
pub mod jog;
pub mod logging;
pub mod port;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod topology;
mod whole;

// Re-export commonly used types for convenience
pub use angle::{AngleParseError, AngleValue};
pub use board::{Address, AddressError, BoardPosition, BoardPositionConfig, FeederBoard};
pub use error::{AppError, AppResult};
pub use feeder::{Feeder, FeederRecord, FeederSnapshot};
pub use jog::{AngleSlot, InputEvent, JogAction, JogMachine, JogMode};
pub use port::{MockSerialPort, PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
pub use protocol::{
    BoardDump, Command, ConnectionError, ControllerSettings, FeederController, FirmwareVersion, ParsedResponse,
    ProtocolError, ResponseKind,
};
pub use registry::{FeederRegistry, RegistryError};
pub use service::{JogOutcome, TuningSession};
pub use topology::{ControllerTopology, TopologyError};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
