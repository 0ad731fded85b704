use log::debug;

use filtering::{covariance::is_positive_semi_definite, FilterError};
use types::{
    field_dimensions::FieldDimensions, odometry::OdometryDelta, parameters::SelfLocatorParameters,
    registered_measurements::RegisteredMeasurement,
};

use crate::{
    hypothesis::{HypothesisId, PoseHypothesis},
    hypothesis_predicter::HypothesisPredicter,
    HypothesisPopulation,
};

/// Outcome of one cycle's measurements for a single hypothesis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub id: HypothesisId,
    pub matched: usize,
    pub dispatched: usize,
}

impl MatchReport {
    pub fn current_validity(&self) -> Option<f32> {
        (self.dispatched > 0).then(|| self.matched as f32 / self.dispatched as f32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementDispatcher {
    mahalanobis_match_threshold: f32,
    reject_outliers: bool,
    validity_frames: usize,
    field_dimensions: FieldDimensions,
    center_circle_curvature_variance_factor: f32,
}

impl MeasurementDispatcher {
    pub fn new(parameters: &SelfLocatorParameters, field_dimensions: &FieldDimensions) -> Self {
        Self {
            mahalanobis_match_threshold: parameters.mahalanobis_match_threshold,
            reject_outliers: parameters.reject_outliers,
            validity_frames: parameters.validity_frames,
            field_dimensions: *field_dimensions,
            center_circle_curvature_variance_factor: parameters
                .center_circle_curvature_variance_factor,
        }
    }

    /// Predicts every hypothesis with `odometry`, then applies landmarks, lines and poses in that
    /// order and updates validities with the share of matched measurements.
    pub fn dispatch(
        &self,
        population: &mut HypothesisPopulation,
        odometry: &OdometryDelta,
        measurements: &[RegisteredMeasurement],
    ) -> Vec<MatchReport> {
        population.predict(odometry);

        let measurements = well_formed_measurements(measurements);
        population
            .hypotheses_mut()
            .iter_mut()
            .map(|hypothesis| {
                let matched = measurements
                    .iter()
                    .filter(|measurement| self.apply(hypothesis, measurement))
                    .count();
                let report = MatchReport {
                    id: hypothesis.id(),
                    matched,
                    dispatched: measurements.len(),
                };
                if let Some(current_validity) = report.current_validity() {
                    hypothesis.update_validity(self.validity_frames, current_validity);
                }
                if matched > 0 {
                    hypothesis.confirm();
                }
                report
            })
            .collect()
    }

    /// Returns whether the measurement matched the hypothesis.
    fn apply(&self, hypothesis: &mut PoseHypothesis, measurement: &RegisteredMeasurement) -> bool {
        let rollback = *hypothesis;
        let result = match measurement {
            RegisteredMeasurement::Landmark(landmark) => hypothesis.update_by_landmark(landmark),
            RegisteredMeasurement::Line(line) if line.is_part_of_center_circle => hypothesis
                .update_by_line_on_center_circle(
                    line,
                    &self.field_dimensions,
                    self.center_circle_curvature_variance_factor,
                ),
            RegisteredMeasurement::Line(line) => hypothesis.update_by_line(line),
            RegisteredMeasurement::Pose(pose) => hypothesis.update_by_pose(pose),
        };
        match result {
            Ok(distance) if distance <= self.mahalanobis_match_threshold => true,
            Ok(distance) => {
                if self.reject_outliers {
                    *hypothesis = rollback;
                }
                debug!(
                    "hypothesis {} rejected measurement at mahalanobis distance {distance}",
                    hypothesis.id()
                );
                false
            }
            Err(error) => {
                debug!("hypothesis {} failed to update: {error}", hypothesis.id());
                false
            }
        }
    }
}

/// Drops measurements that cannot be fused and sorts the rest into dispatch order.
pub fn well_formed_measurements(
    measurements: &[RegisteredMeasurement],
) -> Vec<RegisteredMeasurement> {
    let mut well_formed: Vec<_> = measurements
        .iter()
        .filter(|measurement| match check_measurement(measurement) {
            Ok(()) => true,
            Err(error) => {
                debug!("discarding measurement {measurement:?}: {error}");
                false
            }
        })
        .copied()
        .collect();
    well_formed.sort_by_key(|measurement| measurement.dispatch_rank());
    well_formed
}

fn check_measurement(measurement: &RegisteredMeasurement) -> Result<(), FilterError> {
    if !measurement.has_finite_values() {
        return Err(FilterError::DegenerateMeasurement);
    }
    let has_valid_covariance = match measurement {
        RegisteredMeasurement::Landmark(landmark) => {
            is_positive_semi_definite(&landmark.covariance)
        }
        RegisteredMeasurement::Line(line) => {
            if line.perceived_line_in_robot.unit_direction().is_none()
                || line.model_line_in_field.unit_direction().is_none()
            {
                return Err(FilterError::DegenerateMeasurement);
            }
            is_positive_semi_definite(&line.covariance)
        }
        RegisteredMeasurement::Pose(pose) => is_positive_semi_definite(&pose.covariance),
    };
    if has_valid_covariance {
        Ok(())
    } else {
        Err(FilterError::NotPositiveSemiDefinite)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{point, vector, Isometry2, Matrix2, Matrix3};

    use geometry::line_segment::LineSegment;
    use types::registered_measurements::{
        RegisteredAbsolutePoseMeasurement, RegisteredLandmark, RegisteredLine,
    };

    use super::*;

    fn single_hypothesis_population() -> HypothesisPopulation {
        let mut population = HypothesisPopulation::new(1, 0);
        population.reinitialize(
            &[vector![0.0, 0.0, 0.0]],
            vector![0.2, 0.2, 0.1],
            0.5,
            &FieldDimensions::default(),
        );
        population
    }

    fn dispatcher(validity_frames: usize, reject_outliers: bool) -> MeasurementDispatcher {
        MeasurementDispatcher::new(
            &SelfLocatorParameters {
                validity_frames,
                reject_outliers,
                ..Default::default()
            },
            &FieldDimensions::default(),
        )
    }

    fn landmark(relative_position: nalgebra::Point2<f32>) -> RegisteredMeasurement {
        RegisteredLandmark {
            field_position: point![2.0, 0.0],
            relative_position,
            covariance: Matrix2::identity() * 0.01,
        }
        .into()
    }

    #[test]
    fn measurements_are_sorted_into_dispatch_order() {
        let pose = RegisteredAbsolutePoseMeasurement {
            robot_to_field: Isometry2::identity(),
            covariance: Matrix3::identity(),
        }
        .into();
        let line = RegisteredLine {
            perceived_line_in_robot: LineSegment(point![0.0, 1.0], point![1.0, 1.0]),
            model_line_in_field: LineSegment(point![0.0, 1.0], point![1.0, 1.0]),
            covariance: Matrix2::identity(),
            is_part_of_center_circle: false,
        }
        .into();
        let sorted = well_formed_measurements(&[pose, line, landmark(point![2.0, 0.0])]);
        let ranks: Vec<_> = sorted.iter().map(|m| m.dispatch_rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn malformed_measurements_are_discarded() {
        let negative_variance = RegisteredLandmark {
            field_position: point![1.0, 0.0],
            relative_position: point![1.0, 0.0],
            covariance: Matrix2::from_diagonal(&vector![-1.0, 1.0]),
        }
        .into();
        let degenerate_line = RegisteredLine {
            perceived_line_in_robot: LineSegment(point![1.0, 1.0], point![1.0, 1.0]),
            model_line_in_field: LineSegment(point![0.0, 1.0], point![1.0, 1.0]),
            covariance: Matrix2::identity(),
            is_part_of_center_circle: false,
        }
        .into();
        let not_a_number = landmark(point![f32::NAN, 0.0]);

        assert!(
            well_formed_measurements(&[negative_variance, degenerate_line, not_a_number])
                .is_empty()
        );
    }

    #[test]
    fn matching_landmark_counts_as_match() {
        let mut population = single_hypothesis_population();
        let reports = dispatcher(1, true).dispatch(
            &mut population,
            &OdometryDelta::stationary(),
            &[landmark(point![2.0, 0.0])],
        );
        assert_eq!(reports[0].matched, 1);
        assert_eq!(reports[0].dispatched, 1);
        assert_eq!(population.hypotheses()[0].validity(), 1.0);
    }

    #[test]
    fn outlier_is_rolled_back_and_lowers_validity() {
        let mut population = single_hypothesis_population();
        let reports = dispatcher(1, true).dispatch(
            &mut population,
            &OdometryDelta::stationary(),
            &[landmark(point![2.0, 0.0]), landmark(point![-4.0, 3.0])],
        );
        assert_eq!(reports[0].matched, 1);
        assert_eq!(population.hypotheses()[0].validity(), 0.5);
        assert!(population.hypotheses()[0].pose().x.abs() < 0.05);
    }

    #[test]
    fn matching_confirms_mirrored_companion() {
        let mut population = single_hypothesis_population();
        let companion = population.hypotheses()[0].mirrored_companion(7);
        population.hypotheses_mut()[0] = companion;
        let dispatcher = dispatcher(1, true);

        // seen from the mirrored pose the landmark lies far outside the gate
        dispatcher.dispatch(
            &mut population,
            &OdometryDelta::stationary(),
            &[landmark(point![2.0, 0.0])],
        );
        assert!(population.hypotheses()[0].is_unconfirmed_mirror());

        dispatcher.dispatch(
            &mut population,
            &OdometryDelta::stationary(),
            &[landmark(point![-2.0, 0.0])],
        );
        assert!(!population.hypotheses()[0].is_unconfirmed_mirror());
    }

    #[test]
    fn cycle_without_measurements_keeps_validity() {
        let mut population = single_hypothesis_population();
        let reports =
            dispatcher(1, true).dispatch(&mut population, &OdometryDelta::stationary(), &[]);
        assert_eq!(reports[0].current_validity(), None);
        assert_eq!(population.hypotheses()[0].validity(), 0.5);
    }
}
