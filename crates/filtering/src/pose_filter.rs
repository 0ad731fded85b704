//! Unscented Kalman filter over a 2D pose `[x, y, orientation]`.
//!
//! Sigma points are the mean and the mean ± the columns of `√(n + κ) · L` where `L` is the
//! Cholesky factor of the covariance. Orientations (in the state and in measurements that contain
//! an angle) are averaged as wrapped differences to the central sigma point, so sigma points on
//! both sides of ±π do not cancel out.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use geometry::angle::{angle_difference, normalize_angle};
use types::multivariate_normal_distribution::MultivariateNormalDistribution;

use crate::{
    covariance::{is_positive_semi_definite, repair_covariance, symmetrize},
    FilterError,
};

const STATE_DIMENSION: usize = 3;
const ORIENTATION_COMPONENT: usize = 2;
const NUMBER_OF_SIGMA_POINTS: usize = 2 * STATE_DIMENSION + 1;
const KAPPA: f32 = 1.0;

pub type SigmaPoints = [Vector3<f32>; NUMBER_OF_SIGMA_POINTS];

fn sigma_point_weight(index: usize) -> f32 {
    let spread = STATE_DIMENSION as f32 + KAPPA;
    if index == 0 {
        KAPPA / spread
    } else {
        1.0 / (2.0 * spread)
    }
}

fn wrapped_difference<const DIMENSION: usize>(
    minuend: &SVector<f32, DIMENSION>,
    subtrahend: &SVector<f32, DIMENSION>,
    angle_component: Option<usize>,
) -> SVector<f32, DIMENSION> {
    let mut difference = minuend - subtrahend;
    if let Some(index) = angle_component {
        difference[index] = angle_difference(minuend[index], subtrahend[index]);
    }
    difference
}

fn weighted_mean<const DIMENSION: usize>(
    points: &[SVector<f32, DIMENSION>; NUMBER_OF_SIGMA_POINTS],
    angle_component: Option<usize>,
) -> SVector<f32, DIMENSION> {
    let reference = points[0];
    let offset = points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            wrapped_difference(point, &reference, angle_component) * sigma_point_weight(index)
        })
        .fold(SVector::<f32, DIMENSION>::zeros(), |sum, weighted| sum + weighted);
    let mut mean = reference + offset;
    if let Some(index) = angle_component {
        mean[index] = normalize_angle(mean[index]);
    }
    mean
}

/// Statistics of a measurement function evaluated at the sigma points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnscentedMeasurement<const MEASUREMENT_DIMENSION: usize> {
    pub mean: SVector<f32, MEASUREMENT_DIMENSION>,
    /// Spread of the predicted measurement, without measurement noise.
    pub covariance: SMatrix<f32, MEASUREMENT_DIMENSION, MEASUREMENT_DIMENSION>,
    pub cross_covariance: SMatrix<f32, STATE_DIMENSION, MEASUREMENT_DIMENSION>,
}

pub trait PoseFilter {
    fn sigma_points(&self) -> Result<SigmaPoints, FilterError>;

    fn predict(
        &mut self,
        state_prediction_function: impl Fn(Vector3<f32>) -> Vector3<f32>,
        process_noise: Matrix3<f32>,
    );

    fn predict_measurement<const MEASUREMENT_DIMENSION: usize>(
        &self,
        measurement_function: impl Fn(Vector3<f32>) -> SVector<f32, MEASUREMENT_DIMENSION>,
        angle_component: Option<usize>,
    ) -> Result<UnscentedMeasurement<MEASUREMENT_DIMENSION>, FilterError>;

    /// Returns the Mahalanobis distance of the innovation. On error the filter is left untouched.
    fn update<const MEASUREMENT_DIMENSION: usize>(
        &mut self,
        measurement: SVector<f32, MEASUREMENT_DIMENSION>,
        measurement_noise: SMatrix<f32, MEASUREMENT_DIMENSION, MEASUREMENT_DIMENSION>,
        measurement_function: impl Fn(Vector3<f32>) -> SVector<f32, MEASUREMENT_DIMENSION>,
        angle_component: Option<usize>,
    ) -> Result<f32, FilterError>;
}

impl PoseFilter for MultivariateNormalDistribution<STATE_DIMENSION> {
    fn sigma_points(&self) -> Result<SigmaPoints, FilterError> {
        let lower_triangle = symmetrize(self.covariance)
            .cholesky()
            .ok_or(FilterError::SigmaPointsUnavailable)?
            .l();
        let scale = (STATE_DIMENSION as f32 + KAPPA).sqrt();

        let mut points = [self.mean; NUMBER_OF_SIGMA_POINTS];
        for column_index in 0..STATE_DIMENSION {
            let offset = lower_triangle.column(column_index) * scale;
            points[1 + column_index] = self.mean + offset;
            points[1 + STATE_DIMENSION + column_index] = self.mean - offset;
        }
        Ok(points)
    }

    fn predict(
        &mut self,
        state_prediction_function: impl Fn(Vector3<f32>) -> Vector3<f32>,
        process_noise: Matrix3<f32>,
    ) {
        let sigma_points = match self.sigma_points() {
            Ok(sigma_points) => sigma_points,
            Err(_) => {
                self.covariance = repair_covariance(self.covariance);
                match self.sigma_points() {
                    Ok(sigma_points) => sigma_points,
                    Err(_) => {
                        let mut mean = state_prediction_function(self.mean);
                        mean[ORIENTATION_COMPONENT] = normalize_angle(mean[ORIENTATION_COMPONENT]);
                        self.mean = mean;
                        self.covariance = repair_covariance(self.covariance + process_noise);
                        return;
                    }
                }
            }
        };

        let predicted_points = sigma_points.map(|point| state_prediction_function(point));
        let mean = weighted_mean(&predicted_points, Some(ORIENTATION_COMPONENT));
        let spread = predicted_points
            .iter()
            .enumerate()
            .map(|(index, point)| {
                let difference = wrapped_difference(point, &mean, Some(ORIENTATION_COMPONENT));
                difference * difference.transpose() * sigma_point_weight(index)
            })
            .fold(Matrix3::zeros(), |sum, weighted| sum + weighted);

        let covariance = symmetrize(spread + process_noise);
        self.mean = mean;
        self.covariance = if is_positive_semi_definite(&covariance) {
            covariance
        } else {
            repair_covariance(covariance)
        };
    }

    fn predict_measurement<const MEASUREMENT_DIMENSION: usize>(
        &self,
        measurement_function: impl Fn(Vector3<f32>) -> SVector<f32, MEASUREMENT_DIMENSION>,
        angle_component: Option<usize>,
    ) -> Result<UnscentedMeasurement<MEASUREMENT_DIMENSION>, FilterError> {
        let sigma_points = self.sigma_points()?;
        let predicted_measurements = sigma_points.map(|point| measurement_function(point));
        let mean = weighted_mean(&predicted_measurements, angle_component);

        let mut covariance = SMatrix::<f32, MEASUREMENT_DIMENSION, MEASUREMENT_DIMENSION>::zeros();
        let mut cross_covariance = SMatrix::<f32, STATE_DIMENSION, MEASUREMENT_DIMENSION>::zeros();
        for (index, (sigma_point, predicted_measurement)) in sigma_points
            .iter()
            .zip(predicted_measurements.iter())
            .enumerate()
        {
            let weight = sigma_point_weight(index);
            let measurement_difference =
                wrapped_difference(predicted_measurement, &mean, angle_component);
            let state_difference =
                wrapped_difference(sigma_point, &self.mean, Some(ORIENTATION_COMPONENT));
            covariance += measurement_difference * measurement_difference.transpose() * weight;
            cross_covariance += state_difference * measurement_difference.transpose() * weight;
        }

        Ok(UnscentedMeasurement {
            mean,
            covariance,
            cross_covariance,
        })
    }

    fn update<const MEASUREMENT_DIMENSION: usize>(
        &mut self,
        measurement: SVector<f32, MEASUREMENT_DIMENSION>,
        measurement_noise: SMatrix<f32, MEASUREMENT_DIMENSION, MEASUREMENT_DIMENSION>,
        measurement_function: impl Fn(Vector3<f32>) -> SVector<f32, MEASUREMENT_DIMENSION>,
        angle_component: Option<usize>,
    ) -> Result<f32, FilterError> {
        let predicted = self.predict_measurement(measurement_function, angle_component)?;
        let innovation_covariance = symmetrize(predicted.covariance + measurement_noise);
        let innovation_covariance_inverse = innovation_covariance
            .cholesky()
            .ok_or(FilterError::SingularInnovationCovariance)?
            .inverse();
        let innovation = wrapped_difference(&measurement, &predicted.mean, angle_component);
        let squared_mahalanobis_distance =
            (innovation.transpose() * innovation_covariance_inverse * innovation)[(0, 0)];

        let kalman_gain = predicted.cross_covariance * innovation_covariance_inverse;
        let mut mean = self.mean + kalman_gain * innovation;
        mean[ORIENTATION_COMPONENT] = normalize_angle(mean[ORIENTATION_COMPONENT]);
        let covariance = symmetrize(
            self.covariance - kalman_gain * innovation_covariance * kalman_gain.transpose(),
        );
        if !is_positive_semi_definite(&covariance) {
            return Err(FilterError::NotPositiveSemiDefinite);
        }

        self.mean = mean;
        self.covariance = covariance;
        Ok(squared_mahalanobis_distance.max(0.0).sqrt())
    }
}
