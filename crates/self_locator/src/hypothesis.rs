use std::f32::consts::PI;

use nalgebra::{
    matrix, vector, Isometry2, Matrix2, Matrix3, Point2, Rotation2, Vector2, Vector3,
};
use serde::{Deserialize, Serialize};

use filtering::{kalman_filter::KalmanFilter, pose_filter::PoseFilter, FilterError};
use geometry::{
    angle::{angle_difference, normalize_angle},
    line_segment::left_normal,
};
use types::{
    field_dimensions::FieldDimensions,
    multivariate_normal_distribution::MultivariateNormalDistribution,
    odometry::OdometryDelta,
    registered_measurements::{
        RegisteredAbsolutePoseMeasurement, RegisteredLandmark, RegisteredLine,
    },
    robot_pose::EstimatedRobotPose,
};

pub type HypothesisId = u64;

const LINE_BEARING_COMPONENT: usize = 1;
const POSE_ORIENTATION_COMPONENT: usize = 2;

/// One pose estimate `[x, y, orientation]` in field coordinates, filtered by an unscented Kalman
/// filter, together with the bookkeeping needed for resampling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseHypothesis {
    filter: MultivariateNormalDistribution<3>,
    weighting: f32,
    validity: f32,
    id: HypothesisId,
    cycles_at_weighting_floor: usize,
    /// Spawned as a mirror image and not yet backed by a measurement of its own.
    unconfirmed_mirror: bool,
}

impl PoseHypothesis {
    /// `pose_deviation` holds standard deviations per dimension.
    pub fn new(
        pose: Vector3<f32>,
        pose_deviation: Vector3<f32>,
        id: HypothesisId,
        validity: f32,
    ) -> Self {
        let mean = vector![pose.x, pose.y, normalize_angle(pose.z)];
        let validity = validity.clamp(0.0, 1.0);
        Self {
            filter: MultivariateNormalDistribution::from_deviation(mean, pose_deviation),
            weighting: validity,
            validity,
            id,
            cycles_at_weighting_floor: 0,
            unconfirmed_mirror: false,
        }
    }

    pub fn pose(&self) -> Vector3<f32> {
        self.filter.mean
    }

    pub fn covariance(&self) -> Matrix3<f32> {
        self.filter.covariance
    }

    pub fn robot_to_field(&self) -> Isometry2<f32> {
        Isometry2::new(self.filter.mean.xy(), self.filter.mean.z)
    }

    pub fn validity(&self) -> f32 {
        self.validity
    }

    pub fn weighting(&self) -> f32 {
        self.weighting
    }

    pub fn id(&self) -> HypothesisId {
        self.id
    }

    pub fn cycles_at_weighting_floor(&self) -> usize {
        self.cycles_at_weighting_floor
    }

    pub fn is_finite(&self) -> bool {
        self.filter.is_finite()
    }

    pub fn is_unconfirmed_mirror(&self) -> bool {
        self.unconfirmed_mirror
    }

    /// Mirrored copy of `self` with identity `id`, unconfirmed until it matches a measurement.
    pub fn mirrored_companion(&self, id: HypothesisId) -> Self {
        let mut companion = Self {
            id,
            unconfirmed_mirror: true,
            ..*self
        };
        companion.mirror();
        companion
    }

    pub fn confirm(&mut self) {
        self.unconfirmed_mirror = false;
    }

    /// Independent copy carrying a different identity.
    pub fn with_id(&self, id: HypothesisId) -> Self {
        Self { id, ..*self }
    }

    pub fn estimated_pose(&self) -> EstimatedRobotPose {
        EstimatedRobotPose {
            robot_to_field: self.robot_to_field(),
            covariance: self.filter.covariance,
            validity: self.validity,
            hypothesis_id: self.id,
        }
    }

    /// Adds `noise` to the covariance, used to keep resampled copies diverse.
    pub fn diversify(&mut self, noise: Matrix3<f32>) {
        self.filter.covariance += noise;
    }

    pub fn predict(&mut self, odometry: &OdometryDelta) {
        let walked_translation = odometry.current_odometry_to_last_odometry.translation.vector;
        let walked_rotation = odometry.current_odometry_to_last_odometry.rotation.angle();

        let (sine, cosine) = self.filter.mean.z.sin_cos();
        let robot_to_field_rotation = matrix![
            cosine, -sine, 0.0;
            sine, cosine, 0.0;
            0.0, 0.0, 1.0;
        ];
        let process_noise =
            robot_to_field_rotation * odometry.covariance * robot_to_field_rotation.transpose();

        PoseFilter::predict(
            &mut self.filter,
            |state| {
                let walked_in_field = Rotation2::new(state.z) * walked_translation;
                vector![
                    state.x + walked_in_field.x,
                    state.y + walked_in_field.y,
                    state.z + walked_rotation
                ]
            },
            process_noise,
        );
    }

    /// The unscented prediction of where the landmark at `field_position` should be seen relative
    /// to the robot.
    pub fn expected_landmark_measurement(
        &self,
        field_position: Point2<f32>,
    ) -> Result<Point2<f32>, FilterError> {
        let predicted = PoseFilter::predict_measurement(
            &self.filter,
            |state| landmark_in_robot(state, field_position),
            None,
        )?;
        Ok(Point2::from(predicted.mean))
    }

    /// Returns the Mahalanobis distance of the innovation.
    pub fn update_by_landmark(
        &mut self,
        landmark: &RegisteredLandmark,
    ) -> Result<f32, FilterError> {
        let field_position = landmark.field_position;
        PoseFilter::update(
            &mut self.filter,
            landmark.relative_position.coords,
            landmark.covariance,
            |state| landmark_in_robot(state, field_position),
            None,
        )
    }

    /// Fuses (signed distance of the robot to the line, bearing of the line) in robot coordinates.
    pub fn update_by_line(&mut self, line: &RegisteredLine) -> Result<f32, FilterError> {
        let model_start = line.model_line_in_field.0;
        let model_direction = line
            .model_line_in_field
            .unit_direction()
            .ok_or(FilterError::DegenerateMeasurement)?;

        // lines have no inherent orientation, align the perceived one with the expectation
        let expected_direction = Rotation2::new(-self.filter.mean.z) * model_direction;
        let perceived_line = match line.perceived_line_in_robot.unit_direction() {
            Some(direction) if direction.dot(&expected_direction) < 0.0 => {
                line.perceived_line_in_robot.flipped()
            }
            Some(_) => line.perceived_line_in_robot,
            None => return Err(FilterError::DegenerateMeasurement),
        };
        let perceived_direction = perceived_line
            .unit_direction()
            .ok_or(FilterError::DegenerateMeasurement)?;
        let perceived_distance = perceived_line
            .signed_distance_to_point(Point2::origin())
            .ok_or(FilterError::DegenerateMeasurement)?;
        let measurement = vector![
            perceived_distance,
            perceived_direction.y.atan2(perceived_direction.x)
        ];

        PoseFilter::update(
            &mut self.filter,
            measurement,
            line.covariance,
            |state| {
                let world_to_robot = Rotation2::new(-state.z);
                let start_in_robot = world_to_robot * (model_start.coords - state.xy());
                let direction_in_robot = world_to_robot * model_direction;
                vector![
                    -left_normal(direction_in_robot).dot(&start_in_robot),
                    direction_in_robot.y.atan2(direction_in_robot.x)
                ]
            },
            Some(LINE_BEARING_COMPONENT),
        )
    }

    /// Treats the perceived line as a tangent of the center circle and fuses the inferred circle
    /// center as a landmark at the field's center.
    pub fn update_by_line_on_center_circle(
        &mut self,
        line: &RegisteredLine,
        field_dimensions: &FieldDimensions,
        curvature_variance_factor: f32,
    ) -> Result<f32, FilterError> {
        let segment = line.perceived_line_in_robot;
        let direction = segment
            .unit_direction()
            .ok_or(FilterError::DegenerateMeasurement)?;
        let normal = left_normal(direction);
        let field_center = field_dimensions.center();
        let center_circle_radius = field_dimensions.center_circle_radius();
        let expected_center = landmark_in_robot(self.filter.mean, field_center);

        let left_candidate = segment.center() + normal * center_circle_radius;
        let right_candidate = segment.center() - normal * center_circle_radius;
        let circle_center = if (left_candidate.coords - expected_center).norm()
            <= (right_candidate.coords - expected_center).norm()
        {
            left_candidate
        } else {
            right_candidate
        };

        let distance_variance = line.covariance[(0, 0)];
        let tangential_variance = center_circle_radius.powi(2) * line.covariance[(1, 1)];
        let covariance = normal * normal.transpose() * distance_variance
            + direction * direction.transpose() * tangential_variance
            + Matrix2::identity() * curvature_variance_factor * center_circle_radius.powi(2);

        self.update_by_landmark(&RegisteredLandmark {
            field_position: field_center,
            relative_position: circle_center,
            covariance,
        })
    }

    pub fn update_by_pose(
        &mut self,
        pose: &RegisteredAbsolutePoseMeasurement,
    ) -> Result<f32, FilterError> {
        let mean_orientation = self.filter.mean.z;
        let measured_orientation = pose.robot_to_field.rotation.angle();
        let measurement = vector![
            pose.robot_to_field.translation.x,
            pose.robot_to_field.translation.y,
            mean_orientation + angle_difference(measured_orientation, mean_orientation)
        ];
        let distance = KalmanFilter::update(
            &mut self.filter,
            Matrix3::identity(),
            measurement,
            pose.covariance,
        )?;
        self.filter.mean[POSE_ORIENTATION_COMPONENT] =
            normalize_angle(self.filter.mean[POSE_ORIENTATION_COMPONENT]);
        Ok(distance)
    }

    /// Rotates the whole estimate by 180° around the field's center.
    pub fn mirror(&mut self) {
        let half_turn = matrix![
            -1.0, 0.0, 0.0;
            0.0, -1.0, 0.0;
            0.0, 0.0, 1.0;
        ];
        let mean = self.filter.mean;
        self.filter.mean = vector![-mean.x, -mean.y, normalize_angle(mean.z + PI)];
        self.filter.covariance = half_turn * self.filter.covariance * half_turn.transpose();
    }

    /// The old validity is weighted by `frames - 1`, `current_validity` by 1.
    pub fn update_validity(&mut self, frames: usize, current_validity: f32) {
        let frames = frames.max(1) as f32;
        let current_validity = current_validity.clamp(0.0, 1.0);
        self.validity = (self.validity * (frames - 1.0) + current_validity) / frames;
    }

    pub fn invalidate(&mut self) {
        self.validity = 0.0;
    }

    pub fn compute_weighting_based_on_validity(&mut self, base_validity_weighting: f32) {
        self.weighting = self.validity.max(base_validity_weighting);
        if self.validity <= base_validity_weighting {
            self.cycles_at_weighting_floor += 1;
        } else {
            self.cycles_at_weighting_floor = 0;
        }
    }

    /// Positional variance plus rotational variance scaled by `rotation_factor` (m²/rad²).
    pub fn combined_variance(&self, rotation_factor: f32) -> f32 {
        let covariance = &self.filter.covariance;
        covariance[(0, 0)] + covariance[(1, 1)] + rotation_factor * covariance[(2, 2)]
    }
}

fn landmark_in_robot(state: Vector3<f32>, field_position: Point2<f32>) -> Vector2<f32> {
    Rotation2::new(-state.z) * (field_position.coords - state.xy())
}
