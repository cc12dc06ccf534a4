//! Conversions between raw register encodings and physical units.
//!
//! Two gyro interpretations coexist: recorded frames sweep the full register
//! range over 0..360 degrees, while live samples are read as a signed offset
//! from the neutral register value. [`GyroEncoding`] selects between them.

use crate::types::{PhysicalSample, RawSample};
use glam::Vec3;
use motion_config::GyroEncoding;
use serde::Deserialize;
use thiserror::Error;

/// Neutral register value shared by every channel.
pub const REGISTER_CENTER: f32 = 32768.0;
/// Raw acceleration counts per unit.
pub const ACCEL_SCALE: f32 = 10000.0;
/// Full unsigned register range.
pub const REGISTER_MAX: f32 = 65535.0;
/// Raw gyro counts per degree in centered-rate mode.
pub const GYRO_COUNTS_PER_DEGREE: f32 = 182.04;

/// Number of integer fields in a frame row.
pub const FRAME_FIELDS: usize = 6;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("Expected 6 fields, found {0}")]
    MissingFields(usize),
    #[error("Field {index} is not an integer: {value:?}")]
    NotAnInteger { index: usize, value: String },
    #[error("Malformed queue payload: {0}")]
    Payload(String),
}

/// Queue entry as pushed by the producer.
#[derive(Debug, Deserialize)]
struct QueuePayload {
    #[serde(default)]
    timestamp: Option<String>,
    accel_x: f32,
    accel_y: f32,
    accel_z: f32,
    gyro_x: f32,
    gyro_y: f32,
    gyro_z: f32,
    #[serde(default)]
    temperature: Option<f32>,
}

pub fn decode_accel(raw: f32) -> f32 {
    (raw - REGISTER_CENTER) / ACCEL_SCALE
}

pub fn decode_gyro(raw: f32, encoding: GyroEncoding) -> f32 {
    match encoding {
        GyroEncoding::FullSweep => raw / REGISTER_MAX * 360.0,
        GyroEncoding::CenteredRate => (raw - REGISTER_CENTER) / GYRO_COUNTS_PER_DEGREE,
    }
}

/// Convert a raw sample with the given gyro interpretation.
pub fn decode_raw(raw: &RawSample, encoding: GyroEncoding) -> PhysicalSample {
    PhysicalSample {
        acceleration: raw.accel.map(decode_accel),
        rotation: raw.gyro.map(|g| decode_gyro(g, encoding)),
    }
}

/// Decode the six integers of a recorded frame (full-sweep rotation).
pub fn decode_csv_frame(fields: [i32; 6]) -> PhysicalSample {
    decode_raw(&RawSample::from_fields(fields), GyroEncoding::FullSweep)
}

/// Decode a live sample. Live gyro registers are normally centered-rate.
pub fn decode_live_sample(raw: &RawSample, encoding: GyroEncoding) -> PhysicalSample {
    decode_raw(raw, encoding)
}

/// Parse one CSV row into its six integer fields. Extra trailing fields are ignored.
pub fn parse_csv_line(line: &str) -> Result<[i32; 6], CodecError> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < FRAME_FIELDS {
        return Err(CodecError::MissingFields(parts.len()));
    }

    let mut fields = [0i32; FRAME_FIELDS];
    for (index, (slot, part)) in fields.iter_mut().zip(&parts).enumerate() {
        let trimmed = part.trim();
        *slot = trimmed.parse().map_err(|_| CodecError::NotAnInteger {
            index,
            value: trimmed.to_string(),
        })?;
    }
    Ok(fields)
}

/// Parse a JSON queue entry.
pub fn parse_queue_payload(text: &str) -> Result<RawSample, CodecError> {
    let payload: QueuePayload =
        serde_json::from_str(text).map_err(|e| CodecError::Payload(e.to_string()))?;

    Ok(RawSample {
        accel: Vec3::new(payload.accel_x, payload.accel_y, payload.accel_z),
        gyro: Vec3::new(payload.gyro_x, payload.gyro_y, payload.gyro_z),
        timestamp: payload.timestamp,
        temperature: payload.temperature,
    })
}

/// Round a raw-domain value for export (ties to even).
pub fn round_raw(value: f32) -> i32 {
    value.round_ties_even() as i32
}

/// Inverse of [`decode_accel`], rounded back onto the register grid.
pub fn encode_accel(value: f32) -> i32 {
    round_raw(value * ACCEL_SCALE + REGISTER_CENTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accel_decodes_around_center() {
        assert_eq!(decode_accel(32768.0), 0.0);
        assert!((decode_accel(42768.0) - 1.0).abs() < 1e-6);
        assert!((decode_accel(22768.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn gyro_modes_disagree_on_the_same_register() {
        let sweep = decode_gyro(32768.0, GyroEncoding::FullSweep);
        let centered = decode_gyro(32768.0, GyroEncoding::CenteredRate);
        assert!((sweep - 180.0).abs() < 0.01);
        assert_eq!(centered, 0.0);

        assert_eq!(decode_gyro(0.0, GyroEncoding::FullSweep), 0.0);
        assert!((decode_gyro(65535.0, GyroEncoding::FullSweep) - 360.0).abs() < 1e-4);
        assert!((decode_gyro(32768.0 + 182.04, GyroEncoding::CenteredRate) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn csv_frame_uses_full_sweep() {
        let sample = decode_csv_frame([32768, 42768, 22768, 0, 65535, 32768]);
        assert!((sample.acceleration.y - 1.0).abs() < 1e-6);
        assert!((sample.acceleration.z + 1.0).abs() < 1e-6);
        assert_eq!(sample.rotation.x, 0.0);
        assert!((sample.rotation.y - 360.0).abs() < 1e-4);
    }

    #[test]
    fn live_sample_uses_configured_encoding() {
        let raw = RawSample::new(Vec3::splat(32768.0), Vec3::new(32768.0, 33678.2, 31857.8));
        let sample = decode_live_sample(&raw, GyroEncoding::CenteredRate);
        assert_eq!(sample.acceleration, Vec3::ZERO);
        assert_eq!(sample.rotation.x, 0.0);
        assert!((sample.rotation.y - 5.0).abs() < 1e-3);
        assert!((sample.rotation.z + 5.0).abs() < 1e-3);
    }

    #[test]
    fn accel_survives_export_rounding() {
        for raw in (0..=65535).step_by(97) {
            let back = encode_accel(decode_accel(raw as f32));
            assert!((back - raw).abs() <= 1, "raw {raw} came back as {back}");
        }
    }

    #[test]
    fn csv_line_parses_six_integers() {
        assert_eq!(
            parse_csv_line("1, 2,3 ,4,5,6").unwrap(),
            [1, 2, 3, 4, 5, 6]
        );
        assert_eq!(
            parse_csv_line("1,2,3,4,5,6,7").unwrap(),
            [1, 2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn csv_line_rejects_short_or_non_numeric_rows() {
        assert_eq!(parse_csv_line("1,2,3"), Err(CodecError::MissingFields(3)));
        assert_eq!(parse_csv_line(""), Err(CodecError::MissingFields(1)));
        assert!(matches!(
            parse_csv_line("1,2,x,4,5,6"),
            Err(CodecError::NotAnInteger { index: 2, .. })
        ));
        assert!(parse_csv_line("1,2,3.5,4,5,6").is_err());
    }

    #[test]
    fn queue_payload_parses_with_optional_fields() {
        let full = r#"{"timestamp":"2024-01-15T10:30:00Z","accel_x":1.0,"accel_y":2.0,"accel_z":3.0,
            "gyro_x":4.0,"gyro_y":5.0,"gyro_z":6.0,"temperature":21.5}"#;
        let sample = parse_queue_payload(full).unwrap();
        assert_eq!(sample.accel, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(sample.gyro, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(sample.timestamp.as_deref(), Some("2024-01-15T10:30:00Z"));
        assert_eq!(sample.temperature, Some(21.5));

        let bare = r#"{"accel_x":1,"accel_y":2,"accel_z":3,"gyro_x":4,"gyro_y":5,"gyro_z":6}"#;
        let sample = parse_queue_payload(bare).unwrap();
        assert_eq!(sample.timestamp, None);
        assert_eq!(sample.temperature, None);
    }

    #[test]
    fn queue_payload_rejects_garbage() {
        assert!(parse_queue_payload("not json").is_err());
        assert!(parse_queue_payload(r#"{"accel_x":1.0}"#).is_err());
    }

    #[test]
    fn export_rounding_ties_to_even() {
        assert_eq!(round_raw(2.5), 2);
        assert_eq!(round_raw(3.5), 4);
        assert_eq!(round_raw(17.4), 17);
    }
}
