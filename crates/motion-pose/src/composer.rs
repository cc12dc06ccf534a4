use crate::pose::{Pose, TransformStep};
use glam::Vec3;
use motion_config::{Axis, AxisRotation, MountingProfile, PoseConfig};
use motion_imu::PhysicalSample;

/// Builds the world pose of the rendered asset from one physical sample.
///
/// Steps, in application order:
/// 1. recentre the asset on its centroid,
/// 2. motion rotation (axes assigned by the mounting profile),
/// 3. base-orientation correction,
/// 4. uniform scale,
/// 5. translate by acceleration plus the ground lift.
///
/// Rotations do not commute; reordering any of these changes the rendered motion.
#[derive(Debug, Clone)]
pub struct PoseComposer {
    model_center: Vec3,
    ground_offset: f32,
    scale: f32,
    base_orientation: Vec<AxisRotation>,
}

impl PoseComposer {
    pub fn new(config: &PoseConfig) -> Self {
        Self {
            model_center: config.model_center,
            ground_offset: config.ground_offset,
            scale: config.scale,
            base_orientation: config.base_orientation.clone(),
        }
    }

    /// Replace the model centre, e.g. once the asset's vertices are known.
    pub fn with_model_center(mut self, center: Vec3) -> Self {
        self.model_center = center;
        self
    }

    pub fn model_center(&self) -> Vec3 {
        self.model_center
    }

    /// Pose for a sample with rotation channels bound by `profile`.
    pub fn compose(&self, sample: &PhysicalSample, profile: MountingProfile) -> Pose {
        let mut steps = Vec::with_capacity(6 + self.base_orientation.len());
        steps.push(TransformStep::Translate(-self.model_center));
        steps.extend(motion_rotation(sample.rotation, profile));
        self.push_rest(&mut steps, sample.acceleration);
        Pose::new(steps)
    }

    /// The un-animated pose: centred, base-oriented, scaled and lifted, with no motion.
    pub fn base_pose(&self) -> Pose {
        let mut steps = Vec::with_capacity(3 + self.base_orientation.len());
        steps.push(TransformStep::Translate(-self.model_center));
        self.push_rest(&mut steps, Vec3::ZERO);
        Pose::new(steps)
    }

    fn push_rest(&self, steps: &mut Vec<TransformStep>, acceleration: Vec3) {
        steps.extend(
            self.base_orientation
                .iter()
                .map(|r| TransformStep::Rotate {
                    axis: r.axis,
                    degrees: r.degrees,
                }),
        );
        steps.push(TransformStep::Scale(self.scale));
        steps.push(TransformStep::Translate(
            acceleration + Vec3::new(0.0, self.ground_offset, 0.0),
        ));
    }
}

/// The three motion rotations for a rotation vector. Zero angles are dropped.
fn motion_rotation(rotation: Vec3, profile: MountingProfile) -> Vec<TransformStep> {
    let bindings = match profile {
        MountingProfile::Direct => [
            (Axis::X, rotation.x),
            (Axis::Y, rotation.y),
            (Axis::Z, rotation.z),
        ],
        MountingProfile::ZUpSensor => [
            (Axis::X, rotation.x),
            (Axis::Y, rotation.z),
            (Axis::Z, rotation.y),
        ],
        MountingProfile::QuarterTurn => [
            (Axis::X, rotation.y),
            (Axis::Y, -rotation.x),
            (Axis::Z, rotation.z),
        ],
    };

    bindings
        .into_iter()
        .filter(|(_, degrees)| *degrees != 0.0)
        .map(|(axis, degrees)| TransformStep::Rotate { axis, degrees })
        .collect()
}

/// Centroid of a vertex set; the origin for an empty set.
pub fn model_center(vertices: &[Vec3]) -> Vec3 {
    if vertices.is_empty() {
        return Vec3::ZERO;
    }
    let sum: Vec3 = vertices.iter().copied().sum();
    sum / vertices.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn composer() -> PoseComposer {
        PoseComposer::new(&PoseConfig::default()).with_model_center(Vec3::new(1.0, 2.0, 3.0))
    }

    fn sample(rotation: Vec3, acceleration: Vec3) -> PhysicalSample {
        PhysicalSample {
            acceleration,
            rotation,
        }
    }

    #[test]
    fn zero_motion_is_the_base_pose() {
        let composer = composer();
        for profile in [
            MountingProfile::Direct,
            MountingProfile::ZUpSensor,
            MountingProfile::QuarterTurn,
        ] {
            let pose = composer.compose(&PhysicalSample::ZERO, profile);
            assert_eq!(pose, composer.base_pose());
        }
    }

    #[test]
    fn base_pose_centres_orients_scales_and_lifts() {
        let composer = composer();
        let steps = composer.base_pose().steps;
        assert_eq!(
            steps,
            vec![
                TransformStep::Translate(Vec3::new(-1.0, -2.0, -3.0)),
                TransformStep::Rotate {
                    axis: Axis::X,
                    degrees: -90.0
                },
                TransformStep::Rotate {
                    axis: Axis::Y,
                    degrees: 90.0
                },
                TransformStep::Scale(0.1),
                TransformStep::Translate(Vec3::new(0.0, 0.4, 0.0)),
            ]
        );

        // The model centre lands on the lifted origin.
        let p = composer.base_pose().transform_point(Vec3::new(1.0, 2.0, 3.0));
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.4, 0.0), 1e-6));
    }

    #[test]
    fn steps_follow_fixed_order() {
        let pose = composer().compose(
            &sample(Vec3::new(10.0, 20.0, 30.0), Vec3::new(0.5, 0.0, -0.5)),
            MountingProfile::Direct,
        );
        assert!(matches!(pose.steps[0], TransformStep::Translate(_)));
        assert_eq!(
            pose.steps[1..4],
            [
                TransformStep::Rotate {
                    axis: Axis::X,
                    degrees: 10.0
                },
                TransformStep::Rotate {
                    axis: Axis::Y,
                    degrees: 20.0
                },
                TransformStep::Rotate {
                    axis: Axis::Z,
                    degrees: 30.0
                },
            ]
        );
        assert_eq!(pose.steps[6], TransformStep::Scale(0.1));
        assert_eq!(
            pose.steps[7],
            TransformStep::Translate(Vec3::new(0.5, 0.4, -0.5))
        );
    }

    #[test]
    fn motion_and_base_rotation_do_not_commute() {
        let composer = composer();
        let rotation = Vec3::new(30.0, 45.0, 60.0);
        let pose = composer.compose(&sample(rotation, Vec3::ZERO), MountingProfile::Direct);

        // Same primitives with steps 2 and 3 swapped.
        let mut swapped = vec![pose.steps[0]];
        swapped.extend_from_slice(&pose.steps[4..6]);
        swapped.extend_from_slice(&pose.steps[1..4]);
        swapped.extend_from_slice(&pose.steps[6..]);
        let swapped = Pose::new(swapped);

        let (_, q, _) = pose.matrix().to_scale_rotation_translation();
        let (_, q_swapped, _) = swapped.matrix().to_scale_rotation_translation();
        assert!(q.angle_between(q_swapped) > 1e-3);
    }

    #[test]
    fn mounting_profiles_bind_channels_to_axes() {
        let rotation = Vec3::new(1.0, 2.0, 3.0);
        let angles = |profile| -> Vec<(Axis, f32)> {
            motion_rotation(rotation, profile)
                .into_iter()
                .map(|step| match step {
                    TransformStep::Rotate { axis, degrees } => (axis, degrees),
                    other => panic!("unexpected step {other:?}"),
                })
                .collect()
        };

        assert_eq!(
            angles(MountingProfile::ZUpSensor),
            vec![(Axis::X, 1.0), (Axis::Y, 3.0), (Axis::Z, 2.0)]
        );
        assert_eq!(
            angles(MountingProfile::QuarterTurn),
            vec![(Axis::X, 2.0), (Axis::Y, -1.0), (Axis::Z, 3.0)]
        );
    }

    #[test]
    fn acceleration_moves_the_asset_in_world_space() {
        let composer = composer();
        let accel = Vec3::new(0.25, -0.1, 0.5);
        let still = composer.base_pose();
        let moved = composer.compose(&sample(Vec3::ZERO, accel), MountingProfile::Direct);

        let centre = composer.model_center();
        let delta = moved.transform_point(centre) - still.transform_point(centre);
        assert!(delta.abs_diff_eq(accel, 1e-6));
    }

    #[test]
    fn rotation_pivots_about_model_centre() {
        let composer = composer();
        let pose = composer.compose(
            &sample(Vec3::new(0.0, 0.0, 75.0), Vec3::ZERO),
            MountingProfile::Direct,
        );
        let p = pose.transform_point(composer.model_center());
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.4, 0.0), 1e-6));

        let expected = Quat::from_rotation_y(90f32.to_radians())
            * Quat::from_rotation_x(-90f32.to_radians())
            * Quat::from_rotation_z(75f32.to_radians());
        let (_, q, _) = pose.matrix().to_scale_rotation_translation();
        assert!(q.angle_between(expected) < 1e-3);
    }

    #[test]
    fn centroid_of_vertices() {
        assert_eq!(model_center(&[]), Vec3::ZERO);
        let c = model_center(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 4.0, 6.0),
            Vec3::new(2.0, 4.0, 6.0),
        ]);
        assert_eq!(c, Vec3::new(1.0, 2.0, 3.0));
    }
}
