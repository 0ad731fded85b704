use nalgebra::{SMatrix, SVector};

use types::multivariate_normal_distribution::MultivariateNormalDistribution;

use crate::{
    covariance::{is_positive_semi_definite, symmetrize},
    FilterError,
};

pub trait KalmanFilter<const STATE_DIMENSION: usize> {
    /// Linear reference model, the unscented predict must agree with it for linear motion.
    fn predict<const CONTROL_DIMENSION: usize>(
        &mut self,
        state_prediction: SMatrix<f32, STATE_DIMENSION, STATE_DIMENSION>,
        control_input_model: SMatrix<f32, STATE_DIMENSION, CONTROL_DIMENSION>,
        control: SVector<f32, CONTROL_DIMENSION>,
        process_noise: SMatrix<f32, STATE_DIMENSION, STATE_DIMENSION>,
    );

    /// Returns the Mahalanobis distance of the innovation. On error the distribution is left
    /// untouched.
    fn update<const MEASUREMENT_DIMENSION: usize>(
        &mut self,
        measurement_prediction: SMatrix<f32, MEASUREMENT_DIMENSION, STATE_DIMENSION>,
        measurement: SVector<f32, MEASUREMENT_DIMENSION>,
        measurement_noise: SMatrix<f32, MEASUREMENT_DIMENSION, MEASUREMENT_DIMENSION>,
    ) -> Result<f32, FilterError>;
}

impl<const STATE_DIMENSION: usize> KalmanFilter<STATE_DIMENSION>
    for MultivariateNormalDistribution<STATE_DIMENSION>
{
    fn predict<const CONTROL_DIMENSION: usize>(
        &mut self,
        state_prediction: SMatrix<f32, STATE_DIMENSION, STATE_DIMENSION>,
        control_input_model: SMatrix<f32, STATE_DIMENSION, CONTROL_DIMENSION>,
        control: SVector<f32, CONTROL_DIMENSION>,
        process_noise: SMatrix<f32, STATE_DIMENSION, STATE_DIMENSION>,
    ) {
        self.mean = state_prediction * self.mean + control_input_model * control;
        self.covariance = symmetrize(
            state_prediction * self.covariance * state_prediction.transpose() + process_noise,
        );
    }

    fn update<const MEASUREMENT_DIMENSION: usize>(
        &mut self,
        measurement_prediction: SMatrix<f32, MEASUREMENT_DIMENSION, STATE_DIMENSION>,
        measurement: SVector<f32, MEASUREMENT_DIMENSION>,
        measurement_noise: SMatrix<f32, MEASUREMENT_DIMENSION, MEASUREMENT_DIMENSION>,
    ) -> Result<f32, FilterError> {
        let residual = measurement - measurement_prediction * self.mean;
        let residual_covariance = symmetrize(
            measurement_prediction * self.covariance * measurement_prediction.transpose()
                + measurement_noise,
        );
        let residual_covariance_inverse = residual_covariance
            .cholesky()
            .ok_or(FilterError::SingularInnovationCovariance)?
            .inverse();
        let squared_mahalanobis_distance =
            (residual.transpose() * residual_covariance_inverse * residual)[(0, 0)];

        let kalman_gain =
            self.covariance * measurement_prediction.transpose() * residual_covariance_inverse;
        let updated_mean = self.mean + kalman_gain * residual;
        let updated_covariance = symmetrize(
            (SMatrix::<f32, STATE_DIMENSION, STATE_DIMENSION>::identity()
                - kalman_gain * measurement_prediction)
                * self.covariance,
        );
        if !is_positive_semi_definite(&updated_covariance) {
            return Err(FilterError::NotPositiveSemiDefinite);
        }

        self.mean = updated_mean;
        self.covariance = updated_covariance;
        Ok(squared_mahalanobis_distance.max(0.0).sqrt())
    }
}
