use nalgebra::{Isometry2, Matrix2, Matrix3, Point2};
use serde::{Deserialize, Serialize};

use geometry::line_segment::LineSegment;

/// A point feature (center circle center, penalty mark, ...) that was matched to its position on
/// the field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisteredLandmark {
    pub field_position: Point2<f32>,
    pub relative_position: Point2<f32>,
    // over the relative position
    pub covariance: Matrix2<f32>,
}

/// A perceived field line that was matched to a line of the field model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisteredLine {
    pub perceived_line_in_robot: LineSegment,
    pub model_line_in_field: LineSegment,
    // over (signed perpendicular distance, bearing)
    pub covariance: Matrix2<f32>,
    /// The line is believed to be a short piece of the center circle's arc.
    pub is_part_of_center_circle: bool,
}

/// A direct observation of the robot pose, e.g. computed from the center circle together with
/// the halfway line.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisteredAbsolutePoseMeasurement {
    pub robot_to_field: Isometry2<f32>,
    // over (x, y, orientation)
    pub covariance: Matrix3<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum RegisteredMeasurement {
    Landmark(RegisteredLandmark),
    Line(RegisteredLine),
    Pose(RegisteredAbsolutePoseMeasurement),
}

impl RegisteredMeasurement {
    /// Dispatch order within one cycle: landmarks, then lines, then poses.
    pub fn dispatch_rank(&self) -> u8 {
        match self {
            RegisteredMeasurement::Landmark(_) => 0,
            RegisteredMeasurement::Line(_) => 1,
            RegisteredMeasurement::Pose(_) => 2,
        }
    }

    pub fn has_finite_values(&self) -> bool {
        match self {
            RegisteredMeasurement::Landmark(landmark) => {
                landmark.field_position.iter().all(|value| value.is_finite())
                    && landmark.relative_position.iter().all(|value| value.is_finite())
                    && landmark.covariance.iter().all(|value| value.is_finite())
            }
            RegisteredMeasurement::Line(line) => {
                let LineSegment(perceived_start, perceived_end) = line.perceived_line_in_robot;
                let LineSegment(model_start, model_end) = line.model_line_in_field;
                [perceived_start, perceived_end, model_start, model_end]
                    .iter()
                    .all(|point| point.iter().all(|value| value.is_finite()))
                    && line.covariance.iter().all(|value| value.is_finite())
            }
            RegisteredMeasurement::Pose(pose) => {
                pose.robot_to_field
                    .translation
                    .vector
                    .iter()
                    .all(|value| value.is_finite())
                    && pose.robot_to_field.rotation.angle().is_finite()
                    && pose.covariance.iter().all(|value| value.is_finite())
            }
        }
    }
}

impl From<RegisteredLandmark> for RegisteredMeasurement {
    fn from(landmark: RegisteredLandmark) -> Self {
        Self::Landmark(landmark)
    }
}

impl From<RegisteredLine> for RegisteredMeasurement {
    fn from(line: RegisteredLine) -> Self {
        Self::Line(line)
    }
}

impl From<RegisteredAbsolutePoseMeasurement> for RegisteredMeasurement {
    fn from(pose: RegisteredAbsolutePoseMeasurement) -> Self {
        Self::Pose(pose)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::point;

    use super::*;

    #[test]
    fn non_finite_landmark_is_detected() {
        let landmark = RegisteredLandmark {
            field_position: point![0.0, 0.0],
            relative_position: point![f32::NAN, 1.0],
            covariance: Matrix2::identity(),
        };
        assert!(!RegisteredMeasurement::from(landmark).has_finite_values());
    }

    #[test]
    fn landmarks_are_dispatched_before_lines_and_poses() {
        let landmark = RegisteredMeasurement::Landmark(RegisteredLandmark {
            field_position: point![0.0, 0.0],
            relative_position: point![1.0, 0.0],
            covariance: Matrix2::identity(),
        });
        let pose = RegisteredMeasurement::Pose(RegisteredAbsolutePoseMeasurement {
            robot_to_field: Isometry2::identity(),
            covariance: Matrix3::identity(),
        });
        assert!(landmark.dispatch_rank() < pose.dispatch_rank());
    }
}
