//! Fixed-rate playback of live and recorded motion, with live recording.

pub mod controller;
pub mod recording;

pub use controller::{ControllerError, PlaybackController, PlaybackState};
pub use recording::{Recording, RecordingBuffer};
