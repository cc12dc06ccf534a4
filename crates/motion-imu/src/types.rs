use glam::Vec3;
use motion_config::GyroEncoding;

/// Raw sensor reading in device units.
///
/// Channels sit in the unsigned 16-bit register range but are carried as `f32`
/// so smoothed values and the queue's float payloads stay representable.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub accel: Vec3,
    pub gyro: Vec3,
    pub timestamp: Option<String>,
    pub temperature: Option<f32>,
}

impl RawSample {
    pub fn new(accel: Vec3, gyro: Vec3) -> Self {
        Self {
            accel,
            gyro,
            timestamp: None,
            temperature: None,
        }
    }

    /// Build from the six integer fields of a CSV row or stored frame.
    pub fn from_fields(fields: [i32; 6]) -> Self {
        let [ax, ay, az, gx, gy, gz] = fields.map(|v| v as f32);
        Self::new(Vec3::new(ax, ay, az), Vec3::new(gx, gy, gz))
    }
}

/// Acceleration and rotation in engineering units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalSample {
    /// Acceleration, read as world-space displacement by the pose composer.
    pub acceleration: Vec3,
    /// Rotation per axis, in degrees.
    pub rotation: Vec3,
}

impl PhysicalSample {
    pub const ZERO: Self = Self {
        acceleration: Vec3::ZERO,
        rotation: Vec3::ZERO,
    };
}

/// One frame of a recorded sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionFrame {
    /// Explicit ordering key (row index for CSV, stored number for runs).
    pub frame_number: u32,
    /// The raw integer fields the frame was decoded from.
    pub fields: [i32; 6],
    pub sample: PhysicalSample,
}

impl MotionFrame {
    /// Decode the raw fields again under a specific gyro encoding.
    pub fn decode(&self, gyro: GyroEncoding) -> PhysicalSample {
        crate::codec::decode_raw(&RawSample::from_fields(self.fields), gyro)
    }
}

/// Six raw-domain integers plus their position in a recording.
///
/// This is the unit written to CSV exports and exchanged with the run store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    pub accel: [i32; 3],
    pub gyro: [i32; 3],
    pub frame_number: u32,
}

impl FrameRecord {
    pub fn fields(&self) -> [i32; 6] {
        [
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
        ]
    }

    pub fn to_csv_line(&self) -> String {
        let [ax, ay, az, gx, gy, gz] = self.fields();
        format!("{ax},{ay},{az},{gx},{gy},{gz}")
    }
}
