//! Tests against a real feeder controller.
//!
//! Ignored by default. Run with:
//! `TEST_PORT=/dev/ttyUSB0 cargo test --features hardware-tests -- --ignored`
//!
//! `TEST_BAUD` overrides the baud rate (default 19200). The tests only read
//! state and move position `000` back to where it started.

#![cfg(feature = "hardware-tests")]

use feeder_tuner::port::PortConfiguration;
use feeder_tuner::protocol::{ControllerSettings, FeederController};
use std::env;
use std::time::Duration;

struct TestPortConfig {
    port_name: String,
    baud_rate: u32,
}

impl TestPortConfig {
    fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(19_200);
        Some(Self { port_name, baud_rate })
    }
}

fn connect() -> Option<FeederController> {
    let Some(config) = TestPortConfig::from_env() else {
        println!("TEST_PORT not set; skipping");
        return None;
    };
    let settings = ControllerSettings {
        read_timeout: Duration::from_secs(2),
        ..ControllerSettings::default()
    };
    let controller = FeederController::connect(
        &config.port_name,
        PortConfiguration::default().with_baud_rate(config.baud_rate),
        settings,
    )
    .expect("failed to open TEST_PORT");
    Some(controller)
}

#[test]
#[ignore]
fn test_real_controller_reports_firmware() {
    let Some(controller) = connect() else { return };
    println!("Firmware: {:?}", controller.firmware_versions());
    assert!(!controller.firmware_versions().is_empty());
}

#[test]
#[ignore]
fn test_real_controller_dump() {
    let Some(mut controller) = connect() else { return };
    let dumps = controller.dump_board_config(Some(0)).expect("M621 B0 failed");
    assert_eq!(dumps.len(), 1);
    for (position, config) in &dumps[0].positions {
        println!("{:02}: {:?}", position, config);
    }
}

#[test]
#[ignore]
fn test_real_controller_move_and_return() {
    let Some(mut controller) = connect() else { return };
    controller.enable_all(true).expect("M611 S1 failed");

    let home = controller.boards()[0].position(0).map(|p| p.retract_angle).unwrap_or_default();
    controller
        .set_position_angle(0, 0, home.offset(5))
        .expect("M603 failed");
    std::thread::sleep(Duration::from_millis(300));
    controller.set_position_angle(0, 0, home).expect("M603 failed");

    controller.enable_all(false).expect("M611 S0 failed");
}
