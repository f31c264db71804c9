//! Boards, positions, and the `BPP` address scheme.

use crate::angle::AngleValue;
use crate::feeder::{defaults, Feeder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Boards a controller chain can address (one address digit, 0-4).
pub const MAX_BOARDS: u8 = 5;

/// Positions per board on stock hardware.
pub const DEFAULT_POSITIONS_PER_BOARD: u8 = 13;

/// Highest position index the two-digit address field can carry.
const MAX_ENCODABLE_POSITION: u8 = 99;

/// Errors building an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("board {0} is outside 0-{max}", max = MAX_BOARDS - 1)]
    Board(u8),

    #[error("position {0} cannot be encoded in two digits")]
    Position(u8),

    #[error("'{0}' is not a BPP address (board digit followed by a two-digit position)")]
    Malformed(String),
}

/// A board/position pair, rendered on the wire as `BPP` (e.g. `012`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub board: u8,
    pub position: u8,
}

impl Address {
    pub fn new(board: u8, position: u8) -> Result<Self, AddressError> {
        if board >= MAX_BOARDS {
            return Err(AddressError::Board(board));
        }
        if position > MAX_ENCODABLE_POSITION {
            return Err(AddressError::Position(position));
        }
        Ok(Self { board, position })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.board, self.position)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::Malformed(s.to_string()));
        }
        let board = s.as_bytes()[0] - b'0';
        let position = (s.as_bytes()[1] - b'0') * 10 + (s.as_bytes()[2] - b'0');
        Self::new(board, position)
    }
}

/// Full servo configuration of one position, as carried by `M620`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPositionConfig {
    pub advance_angle: AngleValue,
    pub half_advance_angle: AngleValue,
    pub retract_angle: AngleValue,
    pub feed_length: u32,
    pub settle_time: u32,
    pub pulsewidth_at_0: u32,
    pub pulsewidth_at_180: u32,
    pub ignore_feedback_pin: bool,
}

impl Default for BoardPositionConfig {
    fn default() -> Self {
        Self {
            advance_angle: defaults::ADVANCE_ANGLE,
            half_advance_angle: defaults::HALF_ADVANCE_ANGLE,
            retract_angle: defaults::RETRACT_ANGLE,
            feed_length: defaults::FEED_LENGTH,
            settle_time: defaults::SETTLE_TIME,
            pulsewidth_at_0: defaults::MIN_PULSEWIDTH,
            pulsewidth_at_180: defaults::MAX_PULSEWIDTH,
            ignore_feedback_pin: true,
        }
    }
}

impl BoardPositionConfig {
    /// Configuration for a feeder, with unset fields taken from defaults.
    pub fn from_feeder(feeder: &Feeder) -> Self {
        let fallback = Self::default();
        Self {
            advance_angle: feeder.advance_angle().unwrap_or(fallback.advance_angle),
            half_advance_angle: feeder.half_advance_angle().unwrap_or(fallback.half_advance_angle),
            retract_angle: feeder.retract_angle().unwrap_or(fallback.retract_angle),
            feed_length: feeder.default_feed_length.unwrap_or(fallback.feed_length),
            settle_time: feeder.settle_time.unwrap_or(fallback.settle_time),
            pulsewidth_at_0: feeder.min_pulsewidth.unwrap_or(fallback.pulsewidth_at_0),
            pulsewidth_at_180: feeder.max_pulsewidth.unwrap_or(fallback.pulsewidth_at_180),
            ignore_feedback_pin: !feeder.feedback_monitored,
        }
    }
}

/// One slot on a board.
///
/// `enabled` and `current_angle` mirror hardware state and are only changed
/// by the protocol engine after the controller has answered.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardPosition {
    pub advance_angle: AngleValue,
    pub half_advance_angle: AngleValue,
    pub retract_angle: AngleValue,
    pub default_feed_length: u32,
    pub settle_time: u32,
    feeder_id: Option<String>,
    enabled: bool,
    current_angle: Option<AngleValue>,
}

impl Default for BoardPosition {
    fn default() -> Self {
        Self {
            advance_angle: defaults::ADVANCE_ANGLE,
            half_advance_angle: defaults::HALF_ADVANCE_ANGLE,
            retract_angle: defaults::RETRACT_ANGLE,
            default_feed_length: defaults::FEED_LENGTH,
            settle_time: defaults::SETTLE_TIME,
            feeder_id: None,
            enabled: false,
            current_angle: None,
        }
    }
}

impl BoardPosition {
    /// Id of the mounted feeder, if any.
    pub fn feeder_id(&self) -> Option<&str> {
        self.feeder_id.as_deref()
    }

    /// Mount a feeder, replacing whatever was assigned before.
    pub fn assign_feeder(&mut self, feeder_id: impl Into<String>) -> Option<String> {
        self.feeder_id.replace(feeder_id.into())
    }

    pub fn remove_feeder(&mut self) -> Option<String> {
        self.feeder_id.take()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_angle(&self) -> Option<AngleValue> {
        self.current_angle
    }

    /// Copy the position-level overrides out of a confirmed `M620`.
    pub(crate) fn apply_config(&mut self, config: &BoardPositionConfig) {
        self.advance_angle = config.advance_angle;
        self.half_advance_angle = config.half_advance_angle;
        self.retract_angle = config.retract_angle;
        self.default_feed_length = config.feed_length;
        self.settle_time = config.settle_time;
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_current_angle(&mut self, angle: AngleValue) {
        self.current_angle = Some(angle);
    }
}

/// A board in the controller chain: a fixed number of positions.
///
/// Boards have no identity of their own beyond their index in the
/// controller's board list, and no independent enable state.
#[derive(Debug, Clone, PartialEq)]
pub struct FeederBoard {
    positions: Vec<BoardPosition>,
}

impl Default for FeederBoard {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIONS_PER_BOARD)
    }
}

impl FeederBoard {
    pub fn new(num_positions: u8) -> Self {
        Self {
            positions: vec![BoardPosition::default(); usize::from(num_positions)],
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, index: u8) -> Option<&BoardPosition> {
        self.positions.get(usize::from(index))
    }

    pub fn position_mut(&mut self, index: u8) -> Option<&mut BoardPosition> {
        self.positions.get_mut(usize::from(index))
    }

    pub fn positions(&self) -> impl Iterator<Item = (u8, &BoardPosition)> {
        // Board sizes are bounded by u8 at construction.
        self.positions
            .iter()
            .enumerate()
            .map(|(index, position)| (index as u8, position))
    }

    pub(crate) fn positions_mut(&mut self) -> impl Iterator<Item = &mut BoardPosition> {
        self.positions.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_rendering() {
        assert_eq!(Address::new(0, 0).unwrap().to_string(), "000");
        assert_eq!(Address::new(1, 5).unwrap().to_string(), "105");
        assert_eq!(Address::new(4, 12).unwrap().to_string(), "412");
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!("412".parse::<Address>().unwrap(), Address { board: 4, position: 12 });
        assert_eq!("007".parse::<Address>().unwrap(), Address { board: 0, position: 7 });
        assert!(matches!("512".parse::<Address>(), Err(AddressError::Board(5))));
        assert!(matches!("12".parse::<Address>(), Err(AddressError::Malformed(_))));
        assert!(matches!("1a2".parse::<Address>(), Err(AddressError::Malformed(_))));
    }

    #[test]
    fn test_position_defaults() {
        let position = BoardPosition::default();
        assert_eq!(position.advance_angle.degrees(), 120);
        assert_eq!(position.half_advance_angle.degrees(), 60);
        assert_eq!(position.retract_angle.degrees(), 45);
        assert_eq!(position.default_feed_length, 4);
        assert_eq!(position.settle_time, 200);
        assert!(!position.enabled());
        assert_eq!(position.feeder_id(), None);
    }

    #[test]
    fn test_assign_overwrites_and_remove_clears() {
        let mut position = BoardPosition::default();
        assert_eq!(position.assign_feeder("F1"), None);
        assert_eq!(position.assign_feeder("F2"), Some("F1".to_string()));
        assert_eq!(position.feeder_id(), Some("F2"));
        assert_eq!(position.remove_feeder(), Some("F2".to_string()));
        assert_eq!(position.feeder_id(), None);
    }

    #[test]
    fn test_config_from_feeder_falls_back_to_defaults() {
        let mut feeder = Feeder::new("F1");
        feeder.set_advance_angle(170);
        feeder.feedback_monitored = true;

        let config = BoardPositionConfig::from_feeder(&feeder);
        assert_eq!(config.advance_angle.degrees(), 170);
        assert_eq!(config.half_advance_angle, defaults::HALF_ADVANCE_ANGLE);
        assert_eq!(config.pulsewidth_at_180, 2500);
        assert!(!config.ignore_feedback_pin);
    }

    #[test]
    fn test_board_indexing() {
        let board = FeederBoard::default();
        assert_eq!(board.len(), 13);
        assert!(board.position(12).is_some());
        assert!(board.position(13).is_none());
        assert_eq!(FeederBoard::new(0).positions().count(), 0);
    }
}
