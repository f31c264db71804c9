//! Servo angle arithmetic.
//!
//! Every angle the tuner reads, stores, or sends goes through [`AngleValue`],
//! which keeps its value in `0..360`. Jog keys, typed numeric input, and
//! captured positions all share [`apply`] so relative and absolute moves
//! behave the same everywhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Degrees in a full servo revolution.
pub const FULL_TURN: i64 = 360;

/// Errors produced while interpreting an angle instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AngleParseError {
    /// The instruction (or the part after its sign) is not an integer.
    #[error("'{0}' is not a number; enter 0-359, or prefix with +/- for a relative move")]
    NotANumber(String),

    /// Nothing was entered.
    #[error("empty angle instruction")]
    Empty,

    /// A stored angle with a fractional part.
    #[error("{0} is not a whole number of degrees")]
    NotWhole(String),
}

/// A servo angle in whole degrees, always within `0..360`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "u16")]
pub struct AngleValue(u16);

impl AngleValue {
    /// Servo origin used by the jog console when no angle is known yet.
    pub const ORIGIN: AngleValue = AngleValue(180);

    /// Const constructor for unsigned degree literals.
    pub const fn from_degrees(degrees: u16) -> Self {
        Self(degrees % FULL_TURN as u16)
    }

    /// Wrap any integer into `0..360`, including negative values.
    pub fn normalize(raw: i64) -> Self {
        Self((((raw % FULL_TURN) + FULL_TURN) % FULL_TURN) as u16)
    }

    /// The angle in degrees.
    pub fn degrees(self) -> u16 {
        self.0
    }

    /// Move by a signed number of degrees, wrapping around.
    pub fn offset(self, delta: i64) -> Self {
        Self::normalize(i64::from(self.0) + delta)
    }
}

/// Free-function form of [`AngleValue::normalize`].
pub fn normalize(raw: i64) -> AngleValue {
    AngleValue::normalize(raw)
}

/// Interpret a jog or numeric-entry instruction against `current`.
///
/// A leading `+` or `-` makes the rest a relative move; anything else is an
/// absolute angle. The result is always normalized.
pub fn apply(current: AngleValue, instruction: &str) -> Result<AngleValue, AngleParseError> {
    let instruction = instruction.trim();
    if instruction.is_empty() {
        return Err(AngleParseError::Empty);
    }

    let (sign, digits) = match instruction.as_bytes()[0] {
        sign @ (b'+' | b'-') => (Some(sign), &instruction[1..]),
        _ => (None, instruction),
    };
    let degrees = digits_mod_turn(digits).ok_or_else(|| AngleParseError::NotANumber(instruction.to_string()))?;

    Ok(match sign {
        Some(b'-') => current.offset(-degrees),
        Some(_) => current.offset(degrees),
        None => AngleValue::normalize(degrees),
    })
}

/// Reduce a run of ASCII digits modulo a full turn, so arbitrarily long
/// inputs wrap instead of overflowing.
fn digits_mod_turn(digits: &str) -> Option<i64> {
    if digits.is_empty() {
        return None;
    }
    digits.bytes().try_fold(0i64, |acc, b| {
        b.is_ascii_digit()
            .then(|| (acc * 10 + i64::from(b - b'0')) % FULL_TURN)
    })
}

impl From<i64> for AngleValue {
    fn from(raw: i64) -> Self {
        Self::normalize(raw)
    }
}

impl TryFrom<f64> for AngleValue {
    type Error = AngleParseError;

    /// Stored angles may be written as `90` or `90.0`.
    fn try_from(raw: f64) -> Result<Self, Self::Error> {
        crate::whole::whole(raw)
            .map(|degrees| Self(degrees.rem_euclid(FULL_TURN as f64) as u16))
            .ok_or_else(|| AngleParseError::NotWhole(raw.to_string()))
    }
}

impl From<i32> for AngleValue {
    fn from(raw: i32) -> Self {
        Self::normalize(i64::from(raw))
    }
}

impl From<AngleValue> for u16 {
    fn from(angle: AngleValue) -> Self {
        angle.0
    }
}

impl FromStr for AngleValue {
    type Err = AngleParseError;

    /// Parse an absolute angle; a signed value is taken relative to 0°.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        apply(AngleValue::default(), s)
    }
}

impl fmt::Display for AngleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_wraps_both_directions() {
        assert_eq!(normalize(0).degrees(), 0);
        assert_eq!(normalize(359).degrees(), 359);
        assert_eq!(normalize(360).degrees(), 0);
        assert_eq!(normalize(725).degrees(), 5);
        assert_eq!(normalize(-1).degrees(), 359);
        assert_eq!(normalize(-725).degrees(), 355);
    }

    #[test]
    fn test_apply_relative_and_absolute() {
        let current = AngleValue::normalize(10);
        assert_eq!(apply(current, "+5").unwrap().degrees(), 15);
        assert_eq!(apply(current, "-15").unwrap().degrees(), 355);
        assert_eq!(apply(current, "90").unwrap().degrees(), 90);
        assert_eq!(apply(current, "400").unwrap().degrees(), 40);
        assert_eq!(apply(current, " 45 ").unwrap().degrees(), 45);
    }

    #[test]
    fn test_apply_rejects_garbage() {
        let current = AngleValue::ORIGIN;
        assert!(matches!(apply(current, "abc"), Err(AngleParseError::NotANumber(_))));
        assert!(matches!(apply(current, "+"), Err(AngleParseError::NotANumber(_))));
        assert!(matches!(apply(current, "+-5"), Err(AngleParseError::NotANumber(_))));
        assert!(matches!(apply(current, "-x"), Err(AngleParseError::NotANumber(_))));
        assert!(matches!(apply(current, "12.5"), Err(AngleParseError::NotANumber(_))));
        assert_eq!(apply(current, "   "), Err(AngleParseError::Empty));
    }

    #[test]
    fn test_long_instructions_wrap_instead_of_overflowing() {
        let current = AngleValue::normalize(10);
        // 10^20 mod 360 = 280
        assert_eq!(apply(current, "100000000000000000000").unwrap().degrees(), 280);
        assert_eq!(apply(current, "+100000000000000000000").unwrap().degrees(), 290);
        assert_eq!(apply(current, "-100000000000000000000").unwrap().degrees(), 90);
        assert_eq!(apply(current, "99999999999999999999").unwrap().degrees(), 279);
    }

    #[test]
    fn test_serde_normalizes_on_load() {
        let angle: AngleValue = serde_json::from_str("-90").unwrap();
        assert_eq!(angle.degrees(), 270);
        assert_eq!(serde_json::to_string(&angle).unwrap(), "270");

        let angle: AngleValue = serde_json::from_str("450.0").unwrap();
        assert_eq!(angle.degrees(), 90);
        assert!(serde_json::from_str::<AngleValue>("12.5").is_err());
    }

    proptest! {
        #[test]
        fn normalize_is_periodic(x in -1_000_000i64..1_000_000, k in -1000i64..1000) {
            prop_assert_eq!(normalize(x), normalize(x + 360 * k));
        }

        #[test]
        fn normalize_stays_in_range(x in any::<i32>()) {
            prop_assert!(normalize(i64::from(x)).degrees() < 360);
        }

        #[test]
        fn absolute_ignores_current(current in 0i64..360, a in 0i64..100_000) {
            let current = normalize(current);
            prop_assert_eq!(apply(current, &a.to_string()).unwrap(), normalize(a));
        }

        #[test]
        fn relative_offsets_current(current in 0i64..360, d in 0i64..100_000, negative in any::<bool>()) {
            let start = normalize(current);
            let (instruction, expected) = if negative {
                (format!("-{d}"), normalize(current - d))
            } else {
                (format!("+{d}"), normalize(current + d))
            };
            prop_assert_eq!(apply(start, &instruction).unwrap(), expected);
        }
    }
}
