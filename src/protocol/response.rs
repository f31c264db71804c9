//! Response parsers.
//!
//! Each command family has its own reply grammar:
//!
//! - generic: a line beginning with `ok` or `error`
//! - `M115`: `FIRMWARE_VERSION:<x> HW_VERSION:<y>`, possibly repeated
//! - `M621`: `BoardAddr:<n>` sections of `M620 ...` lines, each closed by `ok`
//!
//! The parsers are pure and never touch the transport.

use super::error::ProtocolError;
use crate::angle::AngleValue;
use crate::board::BoardPositionConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{trace, warn};

static FIRMWARE_INFO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)FIRMWARE_VERSION:(?P<firmware>\S+)[ \t]+HW_VERSION:(?P<hardware>[^\r\n]+)")
        .unwrap_or_else(|e| unreachable!("firmware pattern is a valid regex: {e}"))
});

static BAUD_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<baud>\d{3,7})\b").unwrap_or_else(|e| unreachable!("baud pattern is a valid regex: {e}"))
});

const BOARD_HEADER: &str = "BoardAddr:";
const POSITION_LINE: &str = "M620";

/// Order of the value fields on an `M620` line.
const M620_FIELDS: [char; 8] = ['A', 'B', 'C', 'F', 'U', 'V', 'W', 'X'];

/// Structured result of one exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParsedResponse {
    /// `ok...`; carries the raw line.
    Success(String),
    /// `error...`; carries the raw line.
    Failure(String),
    FirmwareInfo(Vec<FirmwareVersion>),
    BoardDump(Vec<BoardDump>),
}

impl ParsedResponse {
    /// Short name used in error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(_) => "failure",
            Self::FirmwareInfo(_) => "firmware-info",
            Self::BoardDump(_) => "board-dump",
        }
    }
}

/// One `FIRMWARE_VERSION` / `HW_VERSION` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub firmware: String,
    pub hardware: String,
}

/// Something odd in an `M621` dump that was tolerated rather than fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "anomaly", rename_all = "snake_case")]
pub enum DumpAnomaly {
    /// The same position appeared twice; the later line won.
    DuplicatePosition { position: u8 },
    /// A position line that could not be parsed and was skipped.
    MalformedLine { line: String },
    /// A full `BPP` address whose board digit disagrees with the section.
    AddressMismatch { address: u16 },
    /// The reply ended before this board's closing `ok`.
    Unterminated,
}

/// Configuration of every reported position on one board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardDump {
    pub board_id: u8,
    pub positions: BTreeMap<u8, BoardPositionConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<DumpAnomaly>,
}

impl BoardDump {
    pub fn new(board_id: u8) -> Self {
        Self {
            board_id,
            positions: BTreeMap::new(),
            anomalies: Vec::new(),
        }
    }

    fn flag(&mut self, anomaly: DumpAnomaly) {
        warn!("Board {} dump anomaly: {:?}", self.board_id, anomaly);
        self.anomalies.push(anomaly);
    }
}

/// First non-empty line of a reply.
pub fn first_line(raw: &str) -> Option<&str> {
    raw.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Generic `ok` / `error` classification.
///
/// The prefix match is case-sensitive. Returns `None` for anything else.
pub fn parse_generic(raw: &str) -> Option<ParsedResponse> {
    let line = first_line(raw)?;
    if line.starts_with("ok") {
        Some(ParsedResponse::Success(line.to_string()))
    } else if line.starts_with("error") {
        Some(ParsedResponse::Failure(line.to_string()))
    } else {
        None
    }
}

/// Every version pair found in an `M115` reply, in order.
pub fn parse_firmware_info(raw: &str) -> Vec<FirmwareVersion> {
    FIRMWARE_INFO
        .captures_iter(raw)
        .map(|caps| FirmwareVersion {
            firmware: caps["firmware"].to_string(),
            hardware: caps["hardware"].trim().to_string(),
        })
        .collect()
}

/// Default `M115` handler: at least one version pair or `NoVersionInfo`.
pub fn firmware_handler(raw: &str) -> Result<ParsedResponse, ProtocolError> {
    let versions = parse_firmware_info(raw);
    if versions.is_empty() {
        return Err(ProtocolError::NoVersionInfo {
            response: raw.to_string(),
        });
    }
    Ok(ParsedResponse::FirmwareInfo(versions))
}

/// Baud rate reported by `M575`, if the reply contains one.
pub fn parse_baud_rate(raw: &str) -> Option<u32> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("ok") && !line.starts_with("error"))
        .find_map(|line| BAUD_VALUE.captures(line))
        .and_then(|caps| caps["baud"].parse().ok())
}

/// Parse an `M621` reply into per-board position tables.
///
/// A section starts at `BoardAddr:<n>` and ends at the next header or at an
/// `ok` line. A section with no positions still produces a board. Lines that
/// belong to no section (the command echo, blank lines) are skipped.
pub fn parse_board_dump(raw: &str) -> Vec<BoardDump> {
    let mut boards = Vec::new();
    let mut current: Option<BoardDump> = None;

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(id) = line.strip_prefix(BOARD_HEADER) {
            boards.extend(current.take());
            match id.trim().parse::<u8>() {
                Ok(board_id) => current = Some(BoardDump::new(board_id)),
                Err(_) => warn!("Ignoring board header with bad id: {:?}", line),
            }
        } else if line.starts_with("ok") {
            boards.extend(current.take());
        } else if line.starts_with(POSITION_LINE) {
            let Some(board) = current.as_mut() else {
                warn!("Position line outside any board section: {:?}", line);
                continue;
            };
            match parse_position_line(line) {
                Some((number, config)) => {
                    let position = match resolve_position(board.board_id, number) {
                        Ok(position) => position,
                        Err(anomaly) => {
                            board.flag(anomaly);
                            continue;
                        }
                    };
                    if board.positions.insert(position, config).is_some() {
                        board.flag(DumpAnomaly::DuplicatePosition { position });
                    }
                }
                None => board.flag(DumpAnomaly::MalformedLine {
                    line: line.to_string(),
                }),
            }
        } else {
            trace!("Skipping dump line {:?}", line);
        }
    }

    if let Some(mut board) = current {
        board.flag(DumpAnomaly::Unterminated);
        boards.push(board);
    }
    boards
}

/// `N` may be the bare position (`N7`) or the full address (`N107`).
fn resolve_position(board_id: u8, number: u16) -> Result<u8, DumpAnomaly> {
    if number < 100 {
        return Ok(number as u8);
    }
    if number / 100 != u16::from(board_id) {
        return Err(DumpAnomaly::AddressMismatch { address: number });
    }
    Ok((number % 100) as u8)
}

/// Parse `M620 N<n> A.. B.. C.. F.. U.. V.. W.. X..` positionally.
///
/// Extra trailing fields are ignored; missing or mislabelled ones make the
/// line malformed.
pub fn parse_position_line(line: &str) -> Option<(u16, BoardPositionConfig)> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != POSITION_LINE {
        return None;
    }
    let number: u16 = tokens.next()?.strip_prefix('N')?.parse().ok()?;

    let mut values = [0i64; M620_FIELDS.len()];
    for (slot, letter) in values.iter_mut().zip(M620_FIELDS) {
        *slot = parse_number(tokens.next()?.strip_prefix(letter)?)?;
    }
    let [a, b, c, f, u, v, w, x] = values;

    Some((
        number,
        BoardPositionConfig {
            advance_angle: AngleValue::normalize(a),
            half_advance_angle: AngleValue::normalize(b),
            retract_angle: AngleValue::normalize(c),
            feed_length: u32::try_from(f).ok()?,
            settle_time: u32::try_from(u).ok()?,
            pulsewidth_at_0: u32::try_from(v).ok()?,
            pulsewidth_at_180: u32::try_from(w).ok()?,
            ignore_feedback_pin: x == 1,
        },
    ))
}

/// Integers, plus floats with no fractional part (`4.0`).
fn parse_number(token: &str) -> Option<i64> {
    token.parse::<i64>().ok().or_else(|| {
        let value: f64 = token.parse().ok()?;
        (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
    })
}
