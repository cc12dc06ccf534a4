use glam::{Mat4, Vec3};
use motion_config::Axis;

/// One affine primitive of a pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformStep {
    Translate(Vec3),
    /// Right-handed rotation about a world axis, in degrees.
    Rotate { axis: Axis, degrees: f32 },
    Scale(f32),
}

impl TransformStep {
    pub fn matrix(&self) -> Mat4 {
        match *self {
            TransformStep::Translate(offset) => Mat4::from_translation(offset),
            TransformStep::Rotate { axis, degrees } => {
                Mat4::from_axis_angle(axis.unit(), degrees.to_radians())
            }
            TransformStep::Scale(factor) => Mat4::from_scale(Vec3::splat(factor)),
        }
    }
}

/// Model-space to world-space transform, kept as its ordered primitives.
///
/// `steps[0]` is applied to a model point first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    pub steps: Vec<TransformStep>,
}

impl Pose {
    pub fn new(steps: Vec<TransformStep>) -> Self {
        Self { steps }
    }

    /// Collapse the steps into a single matrix (column vectors, first step rightmost).
    pub fn matrix(&self) -> Mat4 {
        self.steps
            .iter()
            .fold(Mat4::IDENTITY, |acc, step| step.matrix() * acc)
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.matrix().transform_point3(point)
    }

    /// Whether two poses map space identically, within `epsilon` per matrix element.
    pub fn approx_eq(&self, other: &Pose, epsilon: f32) -> bool {
        self.matrix().abs_diff_eq(other.matrix(), epsilon)
    }
}
