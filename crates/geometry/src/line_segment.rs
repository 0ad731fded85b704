use nalgebra::{vector, Point2, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment(pub Point2<f32>, pub Point2<f32>);

impl LineSegment {
    pub fn center(&self) -> Point2<f32> {
        self.0 + (self.1 - self.0) / 2.0
    }

    pub fn direction(&self) -> Vector2<f32> {
        self.1 - self.0
    }

    /// Unit direction, `None` for a degenerate segment.
    pub fn unit_direction(&self) -> Option<Vector2<f32>> {
        self.direction().try_normalize(f32::EPSILON)
    }

    pub fn flipped(&self) -> Self {
        Self(self.1, self.0)
    }

    /// Signed distance of `point` to the infinite line through the segment, positive on the left
    /// of the segment's direction. `None` for a degenerate segment.
    pub fn signed_distance_to_point(&self, point: Point2<f32>) -> Option<f32> {
        let direction = self.unit_direction()?;
        Some(left_normal(direction).dot(&(point - self.0)))
    }
}

/// Normal pointing to the left of `direction`.
pub fn left_normal(direction: Vector2<f32>) -> Vector2<f32> {
    vector![-direction.y, direction.x]
}
