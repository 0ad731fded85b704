use std::f32::consts::{PI, TAU};

/// Wraps an angle into (−π, π].
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Signed difference `to - from`, wrapped into (−π, π].
pub fn angle_difference(to: f32, from: f32) -> f32 {
    normalize_angle(to - from)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn angles_inside_range_are_untouched() {
        assert_relative_eq!(normalize_angle(0.3), 0.3);
        assert_relative_eq!(normalize_angle(-FRAC_PI_2), -FRAC_PI_2);
    }

    #[test]
    fn minus_pi_maps_to_pi() {
        assert_relative_eq!(normalize_angle(-PI), PI);
        assert_relative_eq!(normalize_angle(PI), PI);
    }

    #[test]
    fn full_turns_are_removed() {
        assert_relative_eq!(normalize_angle(0.5 + 2.0 * TAU), 0.5, epsilon = 1e-5);
        assert_relative_eq!(normalize_angle(-0.5 - TAU), -0.5, epsilon = 1e-5);
    }

    #[test]
    fn difference_takes_the_short_way_around() {
        assert_relative_eq!(angle_difference(-3.0, 3.0), TAU - 6.0, epsilon = 1e-5);
        assert_relative_eq!(angle_difference(3.0, -3.0), 6.0 - TAU, epsilon = 1e-5);
    }
}
