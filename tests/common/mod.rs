//! Shared test utilities for feeder tuner tests.
//!
//! This module provides common test infrastructure including:
//! - Scripted controllers built on `MockSerialPort`
//! - Feeder and registry builders
//! - Reference controller replies

#![allow(dead_code)]

use feeder_tuner::board::FeederBoard;
use feeder_tuner::feeder::Feeder;
use feeder_tuner::port::MockSerialPort;
use feeder_tuner::protocol::{ControllerSettings, FeederController, DEFAULT_MODEL};
use feeder_tuner::registry::FeederRegistry;
use std::time::Duration;

/// Reply deadline for scripted controllers. Short, since silent replies run
/// into it.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(40);

/// A typical `M115` reply.
pub const FIRMWARE_REPLY: &str = "FIRMWARE_VERSION:1.4.2 HW_VERSION:slot-v2\nok\n";

/// `M621` reply for a two-board chain: board 0 with two positions, board 1
/// with none.
pub const TWO_BOARD_DUMP: &str = "M621
BoardAddr:0
M620 N0 A180 B125 C56 F4 U480 V500 W2500 X1
M620 N1 A170 B110 C40 F2 U300 V600 W2400 X0
ok [BoardAddr:0]
BoardAddr:1
ok [BoardAddr:1]
";

/// Controller settings with `boards` boards of 13 positions.
pub fn settings(boards: usize) -> ControllerSettings {
    ControllerSettings {
        model: DEFAULT_MODEL.to_string(),
        boards: vec![FeederBoard::new(13); boards],
        read_timeout: TEST_TIMEOUT,
    }
}

/// Create a controller on a scripted port that answers `M115` at connect.
///
/// The returned port shares state with the one inside the controller; queue
/// replies on it and inspect what was written.
pub fn mock_controller(boards: usize) -> (FeederController, MockSerialPort) {
    let mut port = MockSerialPort::new("MOCK0");
    port.queue_reply(FIRMWARE_REPLY);
    let controller = FeederController::attach(Box::new(port.clone()), settings(boards));
    (controller, port)
}

/// Lines written after the connect-time `M115`.
pub fn commands_after_connect(port: &MockSerialPort) -> Vec<String> {
    port.written_lines().into_iter().skip(1).collect()
}

/// A feeder with every motion setting filled in.
pub fn tuned_feeder(id: &str) -> Feeder {
    let mut feeder = Feeder::new(id);
    feeder.model = Some("0805 paper".to_string());
    feeder.set_advance_angle(150);
    feeder.set_half_advance_angle(100);
    feeder.set_retract_angle(30);
    feeder.default_feed_length = Some(4);
    feeder.settle_time = Some(250);
    feeder.min_pulsewidth = Some(550);
    feeder.max_pulsewidth = Some(2450);
    feeder.feedback_monitored = true;
    feeder.tape_width = Some(8.0);
    feeder
}

/// A registry holding `ids`, each a blank feeder.
pub fn registry_with(ids: &[&str]) -> FeederRegistry {
    let mut registry = FeederRegistry::new();
    for id in ids {
        registry
            .insert(Feeder::new(*id))
            .expect("test ids are unique");
    }
    registry
}
