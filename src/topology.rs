//! Controller topology file: which port, which boards, and what is mounted
//! where.
//!
//! ```json
//! { "feeder_controller": {
//!     "model": "PandaPlacerSlotFeederv2",
//!     "port_name": "/dev/ttyUSB0",
//!     "boards": { "0": { "positions": { "3": { "feeder_id": "F1", "advance_angle": 118 } } } } } }
//! ```
//!
//! Unlike the feeder catalog this file describes physical wiring, so every
//! problem with it is fatal rather than papered over with defaults.

use crate::angle::AngleValue;
use crate::board::{FeederBoard, MAX_BOARDS};
use crate::feeder::defaults;
use crate::protocol::{ControllerSettings, FeederController, DEFAULT_MODEL};
use crate::whole::whole_number;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("controller file '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("failed to access controller file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("controller file '{path}' is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("controller file '{0}' has no 'feeder_controller' section")]
    MissingController(PathBuf),

    #[error("board {0} is outside 0-{max}", max = MAX_BOARDS - 1)]
    BoardOutOfRange(u8),

    #[error("board {board} has no position {position} (positions per board: {positions_per_board})")]
    PositionOutOfRange {
        board: u8,
        position: u8,
        positions_per_board: u8,
    },

    #[error("positions per board must be between 1 and 99, got {0}")]
    PositionsPerBoard(u8),

    #[error("failed to serialize controller topology: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct TopologyDocument {
    #[serde(default)]
    feeder_controller: Option<ControllerTopology>,
}

/// The `feeder_controller` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerTopology {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions_per_board: Option<u8>,
    #[serde(default)]
    pub boards: BTreeMap<u8, BoardTopology>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardTopology {
    #[serde(default)]
    pub positions: BTreeMap<u8, PositionTopology>,
}

/// One position entry; absent fields take the stock defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTopology {
    #[serde(default)]
    pub feeder_id: Option<String>,
    #[serde(default = "default_advance")]
    pub advance_angle: AngleValue,
    #[serde(default = "default_half_advance")]
    pub half_advance_angle: AngleValue,
    #[serde(default = "default_retract")]
    pub retract_angle: AngleValue,
    #[serde(default = "default_feed_length", deserialize_with = "whole_number")]
    pub default_feed_length: u32,
    #[serde(default = "default_settle_time", deserialize_with = "whole_number")]
    pub settle_time: u32,
}

impl Default for PositionTopology {
    fn default() -> Self {
        Self {
            feeder_id: None,
            advance_angle: default_advance(),
            half_advance_angle: default_half_advance(),
            retract_angle: default_retract(),
            default_feed_length: default_feed_length(),
            settle_time: default_settle_time(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_advance() -> AngleValue {
    defaults::ADVANCE_ANGLE
}

fn default_half_advance() -> AngleValue {
    defaults::HALF_ADVANCE_ANGLE
}

fn default_retract() -> AngleValue {
    defaults::RETRACT_ANGLE
}

fn default_feed_length() -> u32 {
    defaults::FEED_LENGTH
}

fn default_settle_time() -> u32 {
    defaults::SETTLE_TIME
}

impl ControllerTopology {
    /// A topology with `board_count` empty boards.
    pub fn new(model: impl Into<String>, port_name: Option<String>, board_count: u8, positions_per_board: u8) -> Self {
        Self {
            model: model.into(),
            port_name,
            positions_per_board: Some(positions_per_board),
            boards: (0..board_count).map(|id| (id, BoardTopology::default())).collect(),
        }
    }

    /// Load and validate a controller file.
    ///
    /// `fallback_positions` applies when the file does not set
    /// `positions_per_board`.
    pub fn load(path: impl AsRef<Path>, fallback_positions: u8) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => TopologyError::NotFound(path.to_path_buf()),
            _ => TopologyError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let document: TopologyDocument = serde_json::from_str(&content).map_err(|source| TopologyError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        let mut topology = document
            .feeder_controller
            .ok_or_else(|| TopologyError::MissingController(path.to_path_buf()))?;

        topology.positions_per_board.get_or_insert(fallback_positions);
        topology.validate()?;
        debug!(
            "Loaded topology from {}: {} board(s), {} positions each",
            path.display(),
            topology.board_count(),
            topology.positions_per_board()
        );
        Ok(topology)
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        let positions_per_board = self.positions_per_board();
        if !(1..=99).contains(&positions_per_board) {
            return Err(TopologyError::PositionsPerBoard(positions_per_board));
        }
        for (&board, entry) in &self.boards {
            if board >= MAX_BOARDS {
                return Err(TopologyError::BoardOutOfRange(board));
            }
            if let Some(&position) = entry.positions.keys().find(|&&p| p >= positions_per_board) {
                return Err(TopologyError::PositionOutOfRange {
                    board,
                    position,
                    positions_per_board,
                });
            }
        }
        Ok(())
    }

    pub fn positions_per_board(&self) -> u8 {
        self.positions_per_board
            .unwrap_or(crate::board::DEFAULT_POSITIONS_PER_BOARD)
    }

    /// Highest board id plus one; a file with no boards still has one.
    pub fn board_count(&self) -> usize {
        self.boards
            .keys()
            .next_back()
            .map_or(1, |&highest| usize::from(highest) + 1)
    }

    /// The board model described by this file. Gaps in the board ids become
    /// empty boards.
    pub fn build_boards(&self) -> Vec<FeederBoard> {
        let positions_per_board = self.positions_per_board();
        let mut boards = vec![FeederBoard::new(positions_per_board); self.board_count()];

        for (&board_id, entry) in &self.boards {
            let board = &mut boards[usize::from(board_id)];
            for (&index, spec) in &entry.positions {
                let Some(position) = board.position_mut(index) else {
                    continue;
                };
                position.advance_angle = spec.advance_angle;
                position.half_advance_angle = spec.half_advance_angle;
                position.retract_angle = spec.retract_angle;
                position.default_feed_length = spec.default_feed_length;
                position.settle_time = spec.settle_time;
                if let Some(feeder_id) = spec.feeder_id.as_deref().filter(|id| !id.is_empty()) {
                    position.assign_feeder(feeder_id);
                }
            }
        }
        boards
    }

    pub fn settings(&self, read_timeout: Duration) -> ControllerSettings {
        ControllerSettings {
            model: self.model.clone(),
            boards: self.build_boards(),
            read_timeout,
        }
    }

    /// Describe a board list, one entry per position.
    pub fn from_boards(model: impl Into<String>, port_name: Option<String>, boards: &[FeederBoard]) -> Self {
        let positions_per_board = boards
            .iter()
            .map(FeederBoard::len)
            .max()
            .and_then(|n| u8::try_from(n).ok())
            .unwrap_or(crate::board::DEFAULT_POSITIONS_PER_BOARD);

        let boards = boards
            .iter()
            .enumerate()
            .map(|(board_id, board)| {
                let positions = board
                    .positions()
                    .map(|(index, position)| {
                        (
                            index,
                            PositionTopology {
                                feeder_id: position.feeder_id().map(str::to_string),
                                advance_angle: position.advance_angle,
                                half_advance_angle: position.half_advance_angle,
                                retract_angle: position.retract_angle,
                                default_feed_length: position.default_feed_length,
                                settle_time: position.settle_time,
                            },
                        )
                    })
                    .collect();
                (board_id as u8, BoardTopology { positions })
            })
            .collect();

        Self {
            model: model.into(),
            port_name,
            positions_per_board: Some(positions_per_board),
            boards,
        }
    }

    pub fn from_controller(controller: &FeederController) -> Self {
        Self::from_boards(
            controller.model(),
            Some(controller.port_name().to_string()),
            controller.boards(),
        )
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TopologyError> {
        let path = path.as_ref();
        let io_error = |source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let document = TopologyDocument {
            feeder_controller: Some(self.clone()),
        };
        let json = serde_json::to_string_pretty(&document).map_err(TopologyError::Serialize)?;
        std::fs::write(path, json).map_err(io_error)?;

        info!("Saved controller topology to {}", path.display());
        Ok(())
    }
}
