use chrono::{DateTime, Utc};
use motion_imu::{FrameRecord, RecordedSequenceSource};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the store.
pub type RunId = i64;

/// One stored frame, as it travels over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameData {
    pub accel_x: i32,
    pub accel_y: i32,
    pub accel_z: i32,
    pub gyro_x: i32,
    pub gyro_y: i32,
    pub gyro_z: i32,
    pub frame_number: u32,
}

impl From<&FrameRecord> for FrameData {
    fn from(record: &FrameRecord) -> Self {
        let [accel_x, accel_y, accel_z] = record.accel;
        let [gyro_x, gyro_y, gyro_z] = record.gyro;
        Self {
            accel_x,
            accel_y,
            accel_z,
            gyro_x,
            gyro_y,
            gyro_z,
            frame_number: record.frame_number,
        }
    }
}

impl From<FrameData> for FrameRecord {
    fn from(frame: FrameData) -> Self {
        Self {
            accel: [frame.accel_x, frame.accel_y, frame.accel_z],
            gyro: [frame.gyro_x, frame.gyro_y, frame.gyro_z],
            frame_number: frame.frame_number,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SaveRunRequest<'a> {
    pub name: &'a str,
    pub frames: Vec<FrameData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRunResponse {
    pub id: RunId,
    pub name: String,
    pub frame_count: u32,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// One row of a run listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: RunId,
    pub name: String,
    pub frame_count: u32,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A stored run with all of its frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetails {
    pub id: RunId,
    pub name: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub frames: Vec<FrameData>,
}

impl RunDetails {
    /// Turn the run into a playable sequence, ordered by frame number.
    pub fn into_source(self) -> RecordedSequenceSource {
        RecordedSequenceSource::from_records(
            self.frames
                .into_iter()
                .map(|f| (f.frame_number, FrameRecord::from(f).fields())),
        )
    }
}

/// RFC 3339 timestamps; offset-less ones are read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match DateTime::parse_from_rfc3339(text) {
            Ok(t) => Ok(t.with_timezone(&Utc)),
            Err(e) => text
                .parse::<NaiveDateTime>()
                .map(|naive| naive.and_utc())
                .map_err(|_| e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn save_request_uses_camel_case() {
        let frames = [FrameRecord {
            accel: [1, 2, 3],
            gyro: [4, 5, 6],
            frame_number: 7,
        }];
        let request = SaveRunRequest {
            name: "walk",
            frames: frames.iter().map(FrameData::from).collect(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "walk",
                "frames": [{
                    "accelX": 1, "accelY": 2, "accelZ": 3,
                    "gyroX": 4, "gyroY": 5, "gyroZ": 6,
                    "frameNumber": 7
                }]
            })
        );
    }

    #[test]
    fn summary_accepts_offset_and_naive_timestamps() {
        let with_offset: RunSummary = serde_json::from_str(
            r#"{"id":3,"name":"walk","frameCount":120,"createdAt":"2024-01-15T10:30:00Z"}"#,
        )
        .unwrap();
        let naive: RunSummary = serde_json::from_str(
            r#"{"id":3,"name":"walk","frameCount":120,"createdAt":"2024-01-15T10:30:00.250"}"#,
        )
        .unwrap();

        assert_eq!(with_offset.frame_count, 120);
        assert_eq!(
            with_offset.created_at,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
        );
        assert_eq!(
            (naive.created_at - with_offset.created_at).num_milliseconds(),
            250
        );
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let result: Result<RunSummary, _> = serde_json::from_str(
            r#"{"id":3,"name":"walk","frameCount":1,"createdAt":"yesterday"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn details_play_back_in_frame_order() {
        let details: RunDetails = serde_json::from_str(
            r#"{"id":1,"name":"jump","createdAt":"2024-01-15T10:30:00+02:00","frames":[
                {"accelX":42768,"accelY":32768,"accelZ":32768,"gyroX":0,"gyroY":0,"gyroZ":0,"frameNumber":1},
                {"accelX":32768,"accelY":32768,"accelZ":32768,"gyroX":0,"gyroY":0,"gyroZ":0,"frameNumber":0}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            details.created_at,
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap()
        );

        let mut source = details.into_source();
        assert_eq!(source.len(), 2);
        assert_eq!(source.poll_next().unwrap().fields[0], 32768);
        let second = source.poll_next().unwrap();
        assert_eq!(second.frame_number, 1);
        assert!((second.sample.acceleration.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn details_without_frames_give_an_empty_source() {
        let details: RunDetails =
            serde_json::from_str(r#"{"id":1,"name":"empty","createdAt":"2024-01-15T10:30:00Z"}"#)
                .unwrap();
        assert!(details.into_source().is_empty());
    }
}
