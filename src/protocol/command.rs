//! Typed M-code commands and their wire rendering.

use crate::angle::AngleValue;
use crate::board::{Address, BoardPositionConfig};
use std::fmt;

/// Baud rates the controller firmware accepts for `M575 B<baud>`.
pub const SUPPORTED_BAUD_RATES: [u32; 6] = [4_800, 9_600, 19_200, 38_400, 57_600, 115_200];

/// How much of the reply to wait for before handing it to a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// The first non-empty line.
    Line,
    /// Everything up to and including the `n`th line that starts with `ok`
    /// or `error`.
    UntilTerminal(usize),
}

/// One command line understood by the feeder controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `M115`
    FirmwareInfo,
    /// `M602 N<addr>`
    CheckFeeder(Address),
    /// `M603 N<addr> A<angle>`
    SetAngle(Address, AngleValue),
    /// `M611 S1` / `M611 S0`
    EnableAll(bool),
    /// `M620 N<addr> A.. B.. C.. F.. U.. V.. W.. X..`
    ConfigurePosition(Address, BoardPositionConfig),
    /// `M621` or `M621 B<board>`
    DumpConfig(Option<u8>),
    /// `M575` or `M575 B<baud>`
    BaudRate(Option<u32>),
}

impl Command {
    /// Reply shape to wait for. `M621` for the whole chain depends on the
    /// board count, which only the engine knows.
    pub fn response_kind(&self) -> ResponseKind {
        match self {
            Self::FirmwareInfo | Self::BaudRate(None) | Self::DumpConfig(_) => {
                ResponseKind::UntilTerminal(1)
            }
            _ => ResponseKind::Line,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirmwareInfo => write!(f, "M115"),
            Self::CheckFeeder(address) => write!(f, "M602 N{address}"),
            Self::SetAngle(address, angle) => write!(f, "M603 N{address} A{angle}"),
            Self::EnableAll(on) => write!(f, "M611 S{}", u8::from(*on)),
            Self::ConfigurePosition(address, c) => write!(
                f,
                "M620 N{address} A{} B{} C{} F{} U{} V{} W{} X{}",
                c.advance_angle,
                c.half_advance_angle,
                c.retract_angle,
                c.feed_length,
                c.settle_time,
                c.pulsewidth_at_0,
                c.pulsewidth_at_180,
                u8::from(c.ignore_feedback_pin),
            ),
            Self::DumpConfig(None) => write!(f, "M621"),
            Self::DumpConfig(Some(board)) => write!(f, "M621 B{board}"),
            Self::BaudRate(None) => write!(f, "M575"),
            Self::BaudRate(Some(baud)) => write!(f, "M575 B{baud}"),
        }
    }
}
