//! Feeder records.
//!
//! A [`Feeder`] describes one physical tape cartridge and its servo timing,
//! independent of the board position it happens to be mounted in. Two
//! projections exist and are the only serialization contract:
//!
//! - [`FeederRecord`]: persisted fields, what `feeders.json` holds.
//! - [`FeederSnapshot`]: persisted fields plus transient session state, for
//!   display.

use crate::angle::AngleValue;
use crate::whole::optional_whole_number;
use serde::{Deserialize, Serialize};

/// Values used when neither a feeder nor a position says otherwise.
pub mod defaults {
    use crate::angle::AngleValue;

    pub const ADVANCE_ANGLE: AngleValue = AngleValue::from_degrees(120);
    pub const HALF_ADVANCE_ANGLE: AngleValue = AngleValue::from_degrees(60);
    pub const RETRACT_ANGLE: AngleValue = AngleValue::from_degrees(45);
    /// Feed length in millimetres (one mechanical advance).
    pub const FEED_LENGTH: u32 = 4;
    /// Settle time in milliseconds.
    pub const SETTLE_TIME: u32 = 200;
    /// Servo pulse width at roughly 0°, in microseconds.
    pub const MIN_PULSEWIDTH: u32 = 500;
    /// Servo pulse width at roughly 180°, in microseconds.
    pub const MAX_PULSEWIDTH: u32 = 2500;
}

/// One physical feeder device.
#[derive(Debug, Clone, PartialEq)]
pub struct Feeder {
    id: String,
    pub model: Option<String>,
    pub body_width: Option<f32>,
    pub tape_width: Option<f32>,
    pub min_pitch: Option<f32>,
    advance_angle: Option<AngleValue>,
    half_advance_angle: Option<AngleValue>,
    retract_angle: Option<AngleValue>,
    pub default_feed_length: Option<u32>,
    pub settle_time: Option<u32>,
    pub min_pulsewidth: Option<u32>,
    pub max_pulsewidth: Option<u32>,
    pub feedback_monitored: bool,
    current_angle: Option<AngleValue>,
    enabled: bool,
}

/// Persisted projection of a [`Feeder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeederRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tape_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pitch: Option<f32>,
    #[serde(default)]
    pub advance_angle: Option<AngleValue>,
    #[serde(default)]
    pub half_advance_angle: Option<AngleValue>,
    #[serde(default)]
    pub retract_angle: Option<AngleValue>,
    #[serde(default, deserialize_with = "optional_whole_number")]
    pub default_feed_length: Option<u32>,
    #[serde(default, deserialize_with = "optional_whole_number")]
    pub settle_time: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_whole_number"
    )]
    pub min_pulsewidth: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_whole_number"
    )]
    pub max_pulsewidth: Option<u32>,
    #[serde(default)]
    pub feedback_monitored: bool,
}

/// Full projection of a [`Feeder`], including session-only state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeederSnapshot {
    #[serde(flatten)]
    pub record: FeederRecord,
    pub current_angle: Option<AngleValue>,
    pub enabled: bool,
}

impl Feeder {
    /// A feeder with no configuration beyond its id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: None,
            body_width: None,
            tape_width: None,
            min_pitch: None,
            advance_angle: None,
            half_advance_angle: None,
            retract_angle: None,
            default_feed_length: None,
            settle_time: None,
            min_pulsewidth: None,
            max_pulsewidth: None,
            feedback_monitored: false,
            current_angle: None,
            enabled: false,
        }
    }

    /// Copy every persisted setting of `self` into a new feeder called `id`.
    ///
    /// Transient state starts fresh on the copy.
    pub fn duplicate(&self, id: impl Into<String>) -> Self {
        let mut record = self.to_record();
        record.id = id.into();
        Self::from_record(record)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn advance_angle(&self) -> Option<AngleValue> {
        self.advance_angle
    }

    pub fn half_advance_angle(&self) -> Option<AngleValue> {
        self.half_advance_angle
    }

    pub fn retract_angle(&self) -> Option<AngleValue> {
        self.retract_angle
    }

    pub fn set_advance_angle(&mut self, angle: impl Into<AngleValue>) {
        self.advance_angle = Some(angle.into());
    }

    pub fn set_half_advance_angle(&mut self, angle: impl Into<AngleValue>) {
        self.half_advance_angle = Some(angle.into());
    }

    pub fn set_retract_angle(&mut self, angle: impl Into<AngleValue>) {
        self.retract_angle = Some(angle.into());
    }

    /// Last angle commanded during this session, if any.
    pub fn current_angle(&self) -> Option<AngleValue> {
        self.current_angle
    }

    pub fn set_current_angle(&mut self, angle: AngleValue) {
        self.current_angle = Some(angle);
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn to_record(&self) -> FeederRecord {
        FeederRecord {
            id: self.id.clone(),
            model: self.model.clone(),
            body_width: self.body_width,
            tape_width: self.tape_width,
            min_pitch: self.min_pitch,
            advance_angle: self.advance_angle,
            half_advance_angle: self.half_advance_angle,
            retract_angle: self.retract_angle,
            default_feed_length: self.default_feed_length,
            settle_time: self.settle_time,
            min_pulsewidth: self.min_pulsewidth,
            max_pulsewidth: self.max_pulsewidth,
            feedback_monitored: self.feedback_monitored,
        }
    }

    pub fn snapshot(&self) -> FeederSnapshot {
        FeederSnapshot {
            record: self.to_record(),
            current_angle: self.current_angle,
            enabled: self.enabled,
        }
    }

    pub fn from_record(record: FeederRecord) -> Self {
        Self {
            id: record.id,
            model: record.model,
            body_width: record.body_width,
            tape_width: record.tape_width,
            min_pitch: record.min_pitch,
            advance_angle: record.advance_angle,
            half_advance_angle: record.half_advance_angle,
            retract_angle: record.retract_angle,
            default_feed_length: record.default_feed_length,
            settle_time: record.settle_time,
            min_pulsewidth: record.min_pulsewidth,
            max_pulsewidth: record.max_pulsewidth,
            feedback_monitored: record.feedback_monitored,
            current_angle: None,
            enabled: false,
        }
    }
}

impl From<FeederRecord> for Feeder {
    fn from(record: FeederRecord) -> Self {
        Self::from_record(record)
    }
}
