pub mod composer;
pub mod pose;

pub use composer::{model_center, PoseComposer};
pub use pose::{Pose, TransformStep};
