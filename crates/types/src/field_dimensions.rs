use nalgebra::{point, Point2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDimensions {
    pub length: f32,
    pub width: f32,
    pub border_strip_width: f32,
    pub center_circle_diameter: f32,
}

impl FieldDimensions {
    pub fn center_circle_radius(&self) -> f32 {
        self.center_circle_diameter / 2.0
    }

    pub fn center(&self) -> Point2<f32> {
        point![0.0, 0.0]
    }

    /// Whether `position` lies on the carpet, i.e. inside the field lines or the border strip.
    pub fn is_inside_carpet(&self, position: Point2<f32>) -> bool {
        position.x.abs() <= self.length / 2.0 + self.border_strip_width
            && position.y.abs() <= self.width / 2.0 + self.border_strip_width
    }
}

impl Default for FieldDimensions {
    fn default() -> Self {
        Self {
            length: 9.0,
            width: 6.0,
            border_strip_width: 0.7,
            center_circle_diameter: 1.5,
        }
    }
}
