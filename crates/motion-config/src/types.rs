use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Live sample queue.
    pub queue: QueueConfig,
    /// Remote run store.
    pub store: StoreConfig,
    /// Tick timing, filtering and recording.
    pub playback: PlaybackConfig,
    /// Gyro register interpretation per source kind.
    pub gyro: GyroConfig,
    /// Pose composition constants.
    pub pose: PoseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    /// List key the producer pushes samples onto.
    pub key: String,
    /// Upper bound for a single connect or pop round-trip.
    pub io_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            key: "imu_queue".to_string(),
            io_timeout_ms: 1000,
        }
    }
}

impl QueueConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Interval between ticks of the polling or playback loop (milliseconds).
    pub tick_ms: u64,
    /// Apply the 3-tap smoothing filter on the live path.
    pub filter_enabled: bool,
    /// Which drained samples end up in a recording.
    pub record_policy: RecordPolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            filter_enabled: false,
            record_policy: RecordPolicy::LatestPerTick,
        }
    }
}

/// Which raw samples a live tick appends to an active recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPolicy {
    /// Only the coalesced sample that drove the pose.
    LatestPerTick,
    /// Every sample drained from the queue during the tick.
    EveryDrained,
}

/// How a raw gyro register maps to degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GyroEncoding {
    /// Full raw range swept over 0..360 degrees.
    FullSweep,
    /// Signed offset from the neutral register value (32768).
    CenteredRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GyroConfig {
    pub live: GyroEncoding,
    pub recorded: GyroEncoding,
}

impl Default for GyroConfig {
    fn default() -> Self {
        Self {
            live: GyroEncoding::CenteredRate,
            recorded: GyroEncoding::FullSweep,
        }
    }
}

/// World axis used by a rotation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// A fixed rotation about one axis, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRotation {
    pub axis: Axis,
    pub degrees: f32,
}

/// How the sensor is mounted on the asset: which rotation channel drives which axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountingProfile {
    /// x about X, y about Y, z about Z.
    Direct,
    /// Sensor Z is world up: x about X, z about Y, y about Z.
    ZUpSensor,
    /// Sensor turned a quarter around the vertical: y about X, -x about Y, z about Z.
    QuarterTurn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Centroid of the rendered asset, subtracted before rotating.
    #[serde(with = "vec3_serde")]
    pub model_center: Vec3,
    /// Lift applied on the vertical axis after scaling.
    pub ground_offset: f32,
    /// Uniform scale applied to the asset.
    pub scale: f32,
    pub live_mounting: MountingProfile,
    pub recorded_mounting: MountingProfile,
    /// Rotations aligning the asset's authoring axes with the world, applied in order.
    pub base_orientation: Vec<AxisRotation>,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model_center: Vec3::ZERO,
            ground_offset: 0.4,
            scale: 0.1,
            live_mounting: MountingProfile::QuarterTurn,
            recorded_mounting: MountingProfile::ZUpSensor,
            base_orientation: vec![
                AxisRotation {
                    axis: Axis::X,
                    degrees: -90.0,
                },
                AxisRotation {
                    axis: Axis::Y,
                    degrees: 90.0,
                },
            ],
        }
    }
}

// glam implements Serialize, but arrays read better in TOML.
mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec3, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec3, D::Error> {
        let [x, y, z] = <[f32; 3]>::deserialize(d)?;
        Ok(Vec3::new(x, y, z))
    }
}
