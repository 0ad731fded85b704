use nalgebra::{Isometry2, Matrix3};
use serde::{Deserialize, Serialize};

/// Robot motion since the last cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OdometryDelta {
    /// Transforms points from the current robot frame into the previous one, i.e. the walked
    /// motion expressed in the previous robot frame.
    pub current_odometry_to_last_odometry: Isometry2<f32>,
    /// Covariance over (x, y, rotation) in the robot frame.
    pub covariance: Matrix3<f32>,
}

impl OdometryDelta {
    pub fn new(
        current_odometry_to_last_odometry: Isometry2<f32>,
        covariance: Matrix3<f32>,
    ) -> Self {
        Self {
            current_odometry_to_last_odometry,
            covariance,
        }
    }

    pub fn stationary() -> Self {
        Self {
            current_odometry_to_last_odometry: Isometry2::identity(),
            covariance: Matrix3::zeros(),
        }
    }
}
