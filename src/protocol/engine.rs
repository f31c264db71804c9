//! The feeder controller: one serial transport, its boards, and the
//! command/response dispatch table.
//!
//! Every exchange is strictly sequential: write one line, read until the
//! expected reply shape or the deadline, parse, and only then touch the
//! board model. There is no sequence number on the wire, so at most one
//! command is ever outstanding.

use super::command::{Command, ResponseKind, SUPPORTED_BAUD_RATES};
use super::error::{ConnectionError, ProtocolError};
use super::response::{
    firmware_handler, first_line, parse_baud_rate, parse_board_dump, parse_generic, BoardDump,
    DumpAnomaly, FirmwareVersion, ParsedResponse,
};
use crate::angle::AngleValue;
use crate::board::{Address, BoardPosition, BoardPositionConfig, FeederBoard};
use crate::feeder::Feeder;
use crate::port::{PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort, DEFAULT_READ_TIMEOUT};
use memchr::memchr;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Model string reported for stock controllers.
pub const DEFAULT_MODEL: &str = "PandaPlacerSlotFeederv2";

/// How long a single read may block before the deadline is re-checked.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 256;

/// Parser bound to one exact command string.
pub type ResponseHandler = Box<dyn Fn(&str) -> Result<ParsedResponse, ProtocolError> + Send>;

/// Everything the engine needs besides the transport.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub model: String,
    pub boards: Vec<FeederBoard>,
    /// Deadline for a whole reply, not for a single read.
    pub read_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            boards: vec![FeederBoard::default()],
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Owner of a feeder controller chain.
pub struct FeederController {
    port_name: String,
    model: String,
    port: Option<Box<dyn SerialPortAdapter>>,
    boards: Vec<FeederBoard>,
    handlers: HashMap<String, ResponseHandler>,
    versions: Vec<FirmwareVersion>,
    enabled: bool,
    read_timeout: Duration,
}

impl FeederController {
    /// Open `port_name` and attach to the controller behind it.
    ///
    /// # Example
    /// ```no_run
    /// use feeder_tuner::port::PortConfiguration;
    /// use feeder_tuner::protocol::{ControllerSettings, FeederController};
    ///
    /// let controller = FeederController::connect(
    ///     "/dev/ttyUSB0",
    ///     PortConfiguration::default(),
    ///     ControllerSettings::default(),
    /// )?;
    /// println!("{:?}", controller.firmware_versions());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn connect(
        port_name: &str,
        config: PortConfiguration,
        settings: ControllerSettings,
    ) -> Result<Self, ConnectionError> {
        let port = SyncSerialPort::open(port_name, config).map_err(|source| ConnectionError {
            port_name: port_name.to_string(),
            source,
        })?;
        Ok(Self::attach(Box::new(port), settings))
    }

    /// Build an engine around an already open transport.
    ///
    /// Registers the default `M115` handler and asks for firmware info. A
    /// failure of that first request is logged and otherwise ignored.
    pub fn attach(mut port: Box<dyn SerialPortAdapter>, settings: ControllerSettings) -> Self {
        if let Err(e) = port.set_timeout(POLL_INTERVAL) {
            warn!("Could not shorten read timeout on {}: {}", port.name(), e);
        }

        let mut controller = Self {
            port_name: port.name().to_string(),
            model: settings.model,
            port: Some(port),
            boards: settings.boards,
            handlers: HashMap::new(),
            versions: Vec::new(),
            enabled: false,
            read_timeout: settings.read_timeout,
        };
        controller.handlers.insert(
            Command::FirmwareInfo.to_string(),
            Box::new(firmware_handler),
        );

        match controller.request_firmware_info() {
            Ok(versions) => info!(
                "Connected to {} on {} ({} version line(s))",
                controller.model,
                controller.port_name,
                versions.len()
            ),
            Err(e) => warn!("Firmware info request on {} failed: {}", controller.port_name, e),
        }
        controller
    }

    // ========== Accessors ==========

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn boards(&self) -> &[FeederBoard] {
        &self.boards
    }

    pub fn position(&self, address: Address) -> Option<&BoardPosition> {
        self.boards
            .get(usize::from(address.board))
            .and_then(|board| board.position(address.position))
    }

    /// Mutable access for local bookkeeping (overrides, feeder assignment).
    /// Hardware-mirrored flags stay engine-owned.
    pub fn position_mut(&mut self, address: Address) -> Option<&mut BoardPosition> {
        self.boards
            .get_mut(usize::from(address.board))
            .and_then(|board| board.position_mut(address.position))
    }

    /// Version pairs cached from the last successful `M115`.
    pub fn firmware_versions(&self) -> &[FirmwareVersion] {
        &self.versions
    }

    /// Controller-wide enable flag, as last confirmed.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Resolve a board/position pair against this controller's topology.
    pub fn address(&self, board: u8, position: u8) -> Result<Address, ProtocolError> {
        let invalid = || ProtocolError::InvalidAddress { board, position };
        let exists = self
            .boards
            .get(usize::from(board))
            .is_some_and(|b| b.position(position).is_some());
        if !exists {
            return Err(invalid());
        }
        Address::new(board, position).map_err(|_| invalid())
    }

    // ========== Dispatch ==========

    /// Bind `handler` to the exact command string `command`, replacing any
    /// previous binding.
    pub fn register_handler<F>(&mut self, command: impl Into<String>, handler: F) -> Result<(), ProtocolError>
    where
        F: Fn(&str) -> Result<ParsedResponse, ProtocolError> + Send + 'static,
    {
        let command = command.into();
        let key = command.trim();
        if key.is_empty() {
            return Err(ProtocolError::InvalidHandler(command));
        }
        if self.handlers.insert(key.to_string(), Box::new(handler)).is_some() {
            debug!("Replaced response handler for {}", key);
        }
        Ok(())
    }

    /// Send one command line and parse the reply.
    ///
    /// A handler registered for this exact command wins; otherwise the reply
    /// must start with `ok` or `error`.
    pub fn send(&mut self, command: &str, expect: ResponseKind) -> Result<ParsedResponse, ProtocolError> {
        let raw = self.send_raw(command, expect)?;
        if let Some(handler) = self.handlers.get(command.trim()) {
            return handler(&raw);
        }
        parse_generic(&raw).ok_or_else(|| ProtocolError::Unrecognized {
            command: command.to_string(),
            response: raw,
        })
    }

    /// Send one command line and return the reply text unparsed.
    ///
    /// Stale input is discarded first. No bytes before the deadline is a
    /// `Timeout`; a partial reply is returned as-is.
    pub fn send_raw(&mut self, command: &str, expect: ResponseKind) -> Result<String, ProtocolError> {
        let timeout = self.read_timeout;
        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;
        let transport = |source: PortError| ProtocolError::Transport {
            command: command.to_string(),
            source,
        };

        port.clear_buffers().map_err(transport)?;
        let line = format!("{}\n", command.trim_end());
        port.write_bytes(line.as_bytes()).map_err(transport)?;
        trace!(">> {}", command);

        match read_reply(&mut **port, expect, timeout).map_err(transport)? {
            Some(raw) => {
                trace!("<< {:?}", raw);
                Ok(raw)
            }
            None => {
                warn!("No reply to {} within {:?}", command, timeout);
                Err(ProtocolError::Timeout {
                    command: command.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Send a typed command that must be acknowledged with `ok`.
    fn expect_ok(&mut self, command: &Command) -> Result<String, ProtocolError> {
        let line = command.to_string();
        match self.send(&line, command.response_kind())? {
            ParsedResponse::Success(ack) => Ok(ack),
            ParsedResponse::Failure(message) => {
                warn!("{} rejected: {}", line, message);
                Err(ProtocolError::Rejected { command: line, message })
            }
            other => Err(ProtocolError::UnexpectedResponse {
                command: line,
                kind: other.kind(),
            }),
        }
    }

    // ========== Commands ==========

    /// `M115`; caches the reported versions on success.
    pub fn request_firmware_info(&mut self) -> Result<Vec<FirmwareVersion>, ProtocolError> {
        let command = Command::FirmwareInfo;
        let line = command.to_string();
        match self.send(&line, command.response_kind())? {
            ParsedResponse::FirmwareInfo(versions) => {
                for version in &versions {
                    debug!("Firmware {} on hardware {}", version.firmware, version.hardware);
                }
                self.versions = versions.clone();
                Ok(versions)
            }
            other => Err(ProtocolError::UnexpectedResponse {
                command: line,
                kind: other.kind(),
            }),
        }
    }

    /// `M611`. Disabling clears every flag before the command is sent;
    /// enabling sets them only once the controller has acknowledged.
    pub fn enable_all(&mut self, state: bool) -> Result<(), ProtocolError> {
        if !state {
            self.mark_enabled(false);
        }
        self.expect_ok(&Command::EnableAll(state))?;
        if state {
            self.mark_enabled(true);
        }
        info!("Feeders {}", if state { "enabled" } else { "disabled" });
        Ok(())
    }

    fn mark_enabled(&mut self, state: bool) {
        self.enabled = state;
        for board in &mut self.boards {
            for position in board.positions_mut() {
                position.set_enabled(state);
            }
        }
    }

    /// `M602`: ask whether the feeder at this position responds.
    pub fn check_position(&mut self, board: u8, position: u8) -> Result<(), ProtocolError> {
        let address = self.address(board, position)?;
        self.expect_ok(&Command::CheckFeeder(address))?;
        Ok(())
    }

    /// `M603`: move the servo. The cached angle is only updated after `ok`.
    pub fn set_position_angle(&mut self, board: u8, position: u8, angle: AngleValue) -> Result<(), ProtocolError> {
        let address = self.address(board, position)?;
        self.expect_ok(&Command::SetAngle(address, angle))?;
        if let Some(slot) = self.position_mut(address) {
            slot.set_current_angle(angle);
        }
        debug!("Position {} at {}", address, angle);
        Ok(())
    }

    /// `M620`: push a full position configuration.
    pub fn configure_position(
        &mut self,
        board: u8,
        position: u8,
        config: &BoardPositionConfig,
    ) -> Result<(), ProtocolError> {
        let address = self.address(board, position)?;
        self.expect_ok(&Command::ConfigurePosition(address, *config))?;
        if let Some(slot) = self.position_mut(address) {
            slot.apply_config(config);
        }
        Ok(())
    }

    /// Configure a position from a feeder's settings and record the
    /// assignment once the controller accepts it.
    pub fn apply_feeder(&mut self, board: u8, position: u8, feeder: &Feeder) -> Result<(), ProtocolError> {
        let config = BoardPositionConfig::from_feeder(feeder);
        self.configure_position(board, position, &config)?;
        let address = self.address(board, position)?;
        if let Some(slot) = self.position_mut(address) {
            slot.assign_feeder(feeder.id());
        }
        info!("Applied feeder {} to {}", feeder.id(), address);
        Ok(())
    }

    /// `M621`: read back position configurations, for one board or all.
    ///
    /// Reported positions that exist locally are synced into the model.
    pub fn dump_board_config(&mut self, board: Option<u8>) -> Result<Vec<BoardDump>, ProtocolError> {
        let expect = match board {
            Some(id) if usize::from(id) >= self.boards.len() => return Err(ProtocolError::InvalidBoard(id)),
            Some(_) => ResponseKind::UntilTerminal(1),
            None => ResponseKind::UntilTerminal(self.boards.len().max(1)),
        };
        let line = Command::DumpConfig(board).to_string();
        let raw = self.send_raw(&line, expect)?;

        if let Some(ParsedResponse::Failure(message)) = parse_generic(&raw) {
            return Err(ProtocolError::Rejected { command: line, message });
        }
        let dumps = parse_board_dump(&raw);
        if dumps.is_empty() && parse_generic(&raw).is_none() {
            return Err(ProtocolError::Unrecognized {
                command: line,
                response: raw,
            });
        }

        for dump in &dumps {
            if dump.anomalies.contains(&DumpAnomaly::Unterminated) {
                warn!("Board {} dump was cut short; local model left unchanged", dump.board_id);
                continue;
            }
            let Some(local) = self.boards.get_mut(usize::from(dump.board_id)) else {
                warn!("Controller reported board {} outside the configured topology", dump.board_id);
                continue;
            };
            for (index, config) in &dump.positions {
                match local.position_mut(*index) {
                    Some(slot) => slot.apply_config(config),
                    None => warn!("Board {} reported unknown position {}", dump.board_id, index),
                }
            }
        }
        Ok(dumps)
    }

    /// `M575`: the controller's current baud rate, if it reports one.
    pub fn query_baud_rate(&mut self) -> Result<Option<u32>, ProtocolError> {
        let command = Command::BaudRate(None);
        let line = command.to_string();
        let raw = self.send_raw(&line, command.response_kind())?;
        if let Some(ParsedResponse::Failure(message)) = parse_generic(&raw) {
            return Err(ProtocolError::Rejected { command: line, message });
        }
        Ok(parse_baud_rate(&raw))
    }

    /// `M575 B<baud>`, then switch the local side to match.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ProtocolError> {
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(ProtocolError::UnsupportedBaudRate(baud_rate));
        }
        let command = Command::BaudRate(Some(baud_rate));
        self.expect_ok(&command)?;

        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;
        port.set_baud_rate(baud_rate).map_err(|source| ProtocolError::Transport {
            command: command.to_string(),
            source,
        })?;
        info!("Switched {} to {} baud", self.port_name, baud_rate);
        Ok(())
    }

    /// Release the transport. Later commands fail with `NotConnected`.
    pub fn close(&mut self) {
        if let Some(port) = self.port.take() {
            info!("Closed feeder controller on {}", port.name());
        }
    }
}

impl Drop for FeederController {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FeederController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        handlers.sort_unstable();
        f.debug_struct("FeederController")
            .field("port_name", &self.port_name)
            .field("model", &self.model)
            .field("connected", &self.is_connected())
            .field("boards", &self.boards.len())
            .field("handlers", &handlers)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Read until `expect` is satisfied or `timeout` elapses.
///
/// Returns `None` only if nothing but whitespace arrived.
fn read_reply(
    port: &mut dyn SerialPortAdapter,
    expect: ResponseKind,
    timeout: Duration,
) -> Result<Option<String>, PortError> {
    let deadline = Instant::now() + timeout;
    let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let mut line_start = 0;
    let mut terminals = 0;

    loop {
        // Skip the blocking read while the driver reports an empty input queue.
        let idle = port.bytes_to_read() == Some(0);
        match if idle { Ok(0) } else { port.read_bytes(&mut chunk) } {
            Ok(0) => std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))),
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) if e.is_idle() || matches!(e, PortError::Timeout(_)) => {
                std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
            }
            Err(e) => return Err(e),
        }

        while let Some(offset) = memchr(b'\n', &buffer[line_start..]) {
            let end = line_start + offset;
            let line = String::from_utf8_lossy(&buffer[line_start..end]);
            let line = line.trim();
            line_start = end + 1;

            match expect {
                ResponseKind::Line if !line.is_empty() => return Ok(Some(line.to_string())),
                ResponseKind::UntilTerminal(wanted) if line.starts_with("ok") || line.starts_with("error") => {
                    terminals += 1;
                    if terminals >= wanted {
                        return Ok(Some(String::from_utf8_lossy(&buffer[..line_start]).into_owned()));
                    }
                }
                _ => {}
            }
        }

        if Instant::now() >= deadline {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buffer).into_owned();
    if text.trim().is_empty() {
        return Ok(None);
    }
    warn!("Reply incomplete after {:?}: {:?}", timeout, text);
    Ok(Some(match expect {
        ResponseKind::Line => first_line(&text).unwrap_or_default().to_string(),
        ResponseKind::UntilTerminal(_) => text,
    }))
}
