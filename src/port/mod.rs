//! Serial transport for the feeder controller.
//!
//! The protocol engine talks to hardware only through [`SerialPortAdapter`],
//! so the real port ([`SyncSerialPort`]) and the scripted test double
//! ([`MockSerialPort`]) are interchangeable.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::SyncSerialPort;
pub use traits::*;
