use nalgebra::{Isometry2, Matrix3};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatedRobotPose {
    pub robot_to_field: Isometry2<f32>,
    // [x, y, orientation]
    pub covariance: Matrix3<f32>,
    pub validity: f32,
    pub hypothesis_id: u64,
}

impl EstimatedRobotPose {
    pub fn orientation(&self) -> f32 {
        self.robot_to_field.rotation.angle()
    }
}
