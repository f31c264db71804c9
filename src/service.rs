//! Tuning session: the one object the CLI talks to.
//!
//! A [`TuningSession`] owns the controller, the feeder catalog and the
//! current selection. Angle moves go through [`crate::angle::apply`] and the
//! engine; catalog changes are written back to disk as soon as they happen.
//!
//! ```text
//! CLI / jog console ──> TuningSession ──┬──> FeederController ──> serial port
//!                                       └──> FeederRegistry   ──> feeders.json
//! ```

use crate::angle::{self, AngleValue};
use crate::board::{Address, BoardPosition};
use crate::error::{AppError, AppResult};
use crate::feeder::{Feeder, FeederRecord, FeederSnapshot};
use crate::jog::{AngleSlot, JogAction};
use crate::protocol::{BoardDump, FeederController};
use crate::registry::FeederRegistry;
use crate::topology::ControllerTopology;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What happened in response to one jog action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JogOutcome {
    Moved(AngleValue),
    Captured(AngleSlot, AngleValue),
    Help,
    Entry(String),
    Invalid(char),
    Idle,
    Exit,
}

/// Read one of a position's three motion angles.
pub fn slot_angle(position: &BoardPosition, slot: AngleSlot) -> AngleValue {
    match slot {
        AngleSlot::FullAdvance => position.advance_angle,
        AngleSlot::HalfAdvance => position.half_advance_angle,
        AngleSlot::Retract => position.retract_angle,
    }
}

fn store_in_position(position: &mut BoardPosition, slot: AngleSlot, angle: AngleValue) {
    match slot {
        AngleSlot::FullAdvance => position.advance_angle = angle,
        AngleSlot::HalfAdvance => position.half_advance_angle = angle,
        AngleSlot::Retract => position.retract_angle = angle,
    }
}

fn store_in_feeder(feeder: &mut Feeder, slot: AngleSlot, angle: AngleValue) {
    match slot {
        AngleSlot::FullAdvance => feeder.set_advance_angle(angle),
        AngleSlot::HalfAdvance => feeder.set_half_advance_angle(angle),
        AngleSlot::Retract => feeder.set_retract_angle(angle),
    }
}

#[derive(Debug)]
pub struct TuningSession {
    controller: FeederController,
    registry: FeederRegistry,
    registry_path: PathBuf,
    selection: Option<Address>,
}

impl TuningSession {
    pub fn new(controller: FeederController, registry: FeederRegistry, registry_path: impl Into<PathBuf>) -> Self {
        Self {
            controller,
            registry,
            registry_path: registry_path.into(),
            selection: None,
        }
    }

    /// Start a session with the catalog loaded from `registry_path`.
    pub fn open(controller: FeederController, registry_path: impl Into<PathBuf>) -> Self {
        let registry_path = registry_path.into();
        let registry = FeederRegistry::load(&registry_path);
        Self::new(controller, registry, registry_path)
    }

    // ========== Accessors ==========

    pub fn controller(&self) -> &FeederController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut FeederController {
        &mut self.controller
    }

    pub fn registry(&self) -> &FeederRegistry {
        &self.registry
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn selection(&self) -> Option<Address> {
        self.selection
    }

    fn selected(&self) -> AppResult<Address> {
        self.selection.ok_or(AppError::NoSelection)
    }

    fn position(&self, address: Address) -> AppResult<&BoardPosition> {
        self.controller
            .position(address)
            .ok_or_else(|| self.invalid_address(address))
    }

    fn position_mut(&mut self, address: Address) -> AppResult<&mut BoardPosition> {
        let invalid = self.invalid_address(address);
        self.controller.position_mut(address).ok_or(invalid)
    }

    fn invalid_address(&self, address: Address) -> AppError {
        AppError::Protocol(crate::protocol::ProtocolError::InvalidAddress {
            board: address.board,
            position: address.position,
        })
    }

    // ========== Selection and motion ==========

    /// Make `address` the target of later angle commands.
    pub fn select(&mut self, address: Address) -> AppResult<()> {
        let address = self.controller.address(address.board, address.position)?;
        self.selection = Some(address);
        debug!("Selected {}", address);
        Ok(())
    }

    /// Last confirmed angle of the selected position.
    pub fn current_angle(&self) -> AppResult<Option<AngleValue>> {
        let address = self.selected()?;
        Ok(self.position(address)?.current_angle())
    }

    /// Apply an angle instruction (`"+5"`, `"-1"`, `"90"`) to the selected
    /// position. An unknown current angle counts as the origin.
    pub fn adjust(&mut self, instruction: &str) -> AppResult<AngleValue> {
        let address = self.selected()?;
        let current = self.position(address)?.current_angle().unwrap_or(AngleValue::ORIGIN);
        let target = angle::apply(current, instruction)?;
        self.move_to(address, target)?;
        Ok(target)
    }

    fn move_to(&mut self, address: Address, target: AngleValue) -> AppResult<()> {
        self.controller
            .set_position_angle(address.board, address.position, target)?;

        let feeder_id = self.position(address)?.feeder_id().map(str::to_string);
        if let Some(id) = feeder_id {
            if let Some(feeder) = self.registry.get_mut(&id) {
                feeder.set_current_angle(target);
            }
        }
        Ok(())
    }

    /// Store the current angle into `slot`, on the position and on its
    /// mounted feeder. The catalog is saved when a feeder changed.
    pub fn capture(&mut self, slot: AngleSlot) -> AppResult<AngleValue> {
        let address = self.selected()?;
        let angle = self
            .position(address)?
            .current_angle()
            .ok_or_else(|| AppError::UnknownAngle(address.to_string()))?;

        let position = self.position_mut(address)?;
        store_in_position(position, slot, angle);
        let feeder_id = position.feeder_id().map(str::to_string);

        if let Some(id) = feeder_id {
            match self.registry.get_mut(&id) {
                Some(feeder) => {
                    store_in_feeder(feeder, slot, angle);
                    self.save_registry()?;
                }
                None => warn!("Position {} references unknown feeder '{}'", address, id),
            }
        }
        info!("Stored {} as {} angle for {}", angle, slot, address);
        Ok(angle)
    }

    /// Move the selected position to the angle stored in `slot`.
    pub fn recall(&mut self, slot: AngleSlot) -> AppResult<AngleValue> {
        let address = self.selected()?;
        let target = slot_angle(self.position(address)?, slot);
        self.move_to(address, target)?;
        Ok(target)
    }

    /// Carry out one jog action against the selected position.
    pub fn handle(&mut self, action: JogAction) -> AppResult<JogOutcome> {
        Ok(match action {
            JogAction::Adjust(instruction) => JogOutcome::Moved(self.adjust(&instruction)?),
            JogAction::Capture(slot) => JogOutcome::Captured(slot, self.capture(slot)?),
            JogAction::Recall(slot) => JogOutcome::Moved(self.recall(slot)?),
            JogAction::Help => JogOutcome::Help,
            JogAction::Exit => JogOutcome::Exit,
            JogAction::Entry(buffer) => JogOutcome::Entry(buffer),
            JogAction::Invalid(key) => JogOutcome::Invalid(key),
            JogAction::Ignored => JogOutcome::Idle,
        })
    }

    // ========== Controller-wide ==========

    /// Enable or disable every feeder. Mounted feeders mirror the confirmed
    /// state; on a failed enable they stay disabled.
    pub fn enable_all(&mut self, state: bool) -> AppResult<()> {
        let result = self.controller.enable_all(state);
        let confirmed = self.controller.is_enabled();
        let mounted: Vec<String> = self
            .controller
            .boards()
            .iter()
            .flat_map(|board| board.positions())
            .filter_map(|(_, position)| position.feeder_id().map(str::to_string))
            .collect();
        for id in mounted {
            if let Some(feeder) = self.registry.get_mut(&id) {
                feeder.set_enabled(confirmed);
            }
        }
        Ok(result?)
    }

    pub fn dump(&mut self, board: Option<u8>) -> AppResult<Vec<BoardDump>> {
        Ok(self.controller.dump_board_config(board)?)
    }

    // ========== Mounting ==========

    /// Record that `feeder_id` is mounted at `address`. Returns the feeder
    /// that was there before.
    pub fn assign_feeder(&mut self, address: Address, feeder_id: &str) -> AppResult<Option<String>> {
        if !self.registry.contains(feeder_id) {
            return Err(AppError::UnknownFeeder(feeder_id.to_string()));
        }
        let address = self.controller.address(address.board, address.position)?;
        let previous = self.position_mut(address)?.assign_feeder(feeder_id);
        info!("Mounted {} at {}", feeder_id, address);
        Ok(previous)
    }

    pub fn unassign_feeder(&mut self, address: Address) -> AppResult<Option<String>> {
        let address = self.controller.address(address.board, address.position)?;
        let previous = self.position_mut(address)?.remove_feeder();
        if let Some(id) = &previous {
            info!("Removed {} from {}", id, address);
        }
        Ok(previous)
    }

    /// Push the mounted feeder's configuration to the controller (`M620`).
    pub fn push_feeder_config(&mut self, address: Address) -> AppResult<String> {
        let id = self
            .position(address)?
            .feeder_id()
            .map(str::to_string)
            .ok_or_else(|| AppError::UnknownFeeder(format!("(none mounted at {address})")))?;
        let feeder = self
            .registry
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::UnknownFeeder(id.clone()))?;
        self.controller
            .apply_feeder(address.board, address.position, &feeder)?;
        Ok(id)
    }

    /// Topology document describing the current board model.
    pub fn topology(&self) -> ControllerTopology {
        ControllerTopology::from_controller(&self.controller)
    }

    pub fn save_topology(&self, path: impl AsRef<Path>) -> AppResult<()> {
        Ok(self.topology().save(path)?)
    }

    // ========== Catalog ==========

    pub fn list_feeders(&self) -> Vec<FeederRecord> {
        self.registry.list()
    }

    pub fn list_feeders_full(&self) -> Vec<FeederSnapshot> {
        self.registry.list_full()
    }

    pub fn create_feeder(&mut self, id: &str, template: Option<&str>) -> AppResult<FeederRecord> {
        let record = self.registry.create(id, template)?.to_record();
        self.save_registry()?;
        Ok(record)
    }

    pub fn clone_feeder(&mut self, source_id: &str, new_id: &str) -> AppResult<FeederRecord> {
        let record = self.registry.clone_feeder(source_id, new_id)?.to_record();
        self.save_registry()?;
        Ok(record)
    }

    /// Delete a feeder and unmount it wherever it was mounted.
    pub fn delete_feeder(&mut self, id: &str) -> AppResult<FeederRecord> {
        let removed = self.registry.delete(id)?;

        let mounted: Vec<Address> = self
            .controller
            .boards()
            .iter()
            .enumerate()
            .flat_map(move |(board, positions)| {
                positions
                    .positions()
                    .filter(move |(_, position)| position.feeder_id() == Some(id))
                    .filter_map(move |(index, _)| Address::new(board as u8, index).ok())
            })
            .collect();
        for address in mounted {
            if let Some(position) = self.controller.position_mut(address) {
                position.remove_feeder();
                info!("Unmounted deleted feeder {} from {}", id, address);
            }
        }

        self.registry.write(&self.registry_path)?;
        Ok(removed.to_record())
    }

    /// Edit a feeder in place and save the catalog.
    pub fn update_feeder<F>(&mut self, id: &str, edit: F) -> AppResult<FeederRecord>
    where
        F: FnOnce(&mut Feeder),
    {
        let feeder = self
            .registry
            .get_mut(id)
            .ok_or_else(|| AppError::UnknownFeeder(id.to_string()))?;
        edit(feeder);
        let record = feeder.to_record();
        self.save_registry()?;
        Ok(record)
    }

    pub fn save_registry(&self) -> AppResult<()> {
        Ok(self.registry.save(&self.registry_path)?)
    }

    /// Release the serial port.
    pub fn close(&mut self) {
        self.controller.close();
    }
}
