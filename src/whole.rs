//! Serde helpers for integer settings that older files store as floats.
//!
//! Both `feeders.json` and `feeder_controller.json` may hold `4.0` where a
//! whole number is meant; anything with a fractional part is still rejected.

use serde::{Deserialize, Deserializer};

/// Check that `value` is a finite whole number.
pub(crate) fn whole(value: f64) -> Option<f64> {
    (value.is_finite() && value.fract() == 0.0).then_some(value)
}

fn to_u32<E: serde::de::Error>(value: f64) -> Result<u32, E> {
    match whole(value) {
        Some(v) if (0.0..=f64::from(u32::MAX)).contains(&v) => Ok(v as u32),
        _ => Err(E::custom(format!("expected a non-negative whole number, got {value}"))),
    }
}

/// Accepts `4` as well as `4.0`.
pub(crate) fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    to_u32(f64::deserialize(deserializer)?)
}

/// [`whole_number`] for optional fields; `null` stays `None`.
pub(crate) fn optional_whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Option::<f64>::deserialize(deserializer)?.map(to_u32).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "whole_number")]
        required: u32,
        #[serde(default, deserialize_with = "optional_whole_number")]
        optional: Option<u32>,
    }

    #[test]
    fn test_whole_floats_are_accepted() {
        let sample: Sample = serde_json::from_str(r#"{"required": 4.0, "optional": 250}"#).unwrap();
        assert_eq!(sample.required, 4);
        assert_eq!(sample.optional, Some(250));

        let sample: Sample = serde_json::from_str(r#"{"required": 4, "optional": null}"#).unwrap();
        assert_eq!(sample.optional, None);
        let sample: Sample = serde_json::from_str(r#"{"required": 4}"#).unwrap();
        assert_eq!(sample.optional, None);
    }

    #[test]
    fn test_fractions_and_negatives_are_rejected() {
        assert!(serde_json::from_str::<Sample>(r#"{"required": 4.5}"#).is_err());
        assert!(serde_json::from_str::<Sample>(r#"{"required": -1}"#).is_err());
        assert!(serde_json::from_str::<Sample>(r#"{"required": 1, "optional": 2.25}"#).is_err());
    }
}
