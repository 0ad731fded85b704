use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultivariateNormalDistribution<const DIMENSION: usize> {
    pub mean: SVector<f32, DIMENSION>,
    pub covariance: SMatrix<f32, DIMENSION, DIMENSION>,
}

impl<const DIMENSION: usize> MultivariateNormalDistribution<DIMENSION> {
    pub fn new(
        mean: SVector<f32, DIMENSION>,
        covariance: SMatrix<f32, DIMENSION, DIMENSION>,
    ) -> Self {
        Self { mean, covariance }
    }

    pub fn from_deviation(
        mean: SVector<f32, DIMENSION>,
        deviation: SVector<f32, DIMENSION>,
    ) -> Self {
        Self {
            mean,
            covariance: SMatrix::from_diagonal(&deviation.component_mul(&deviation)),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.mean.iter().all(|value| value.is_finite())
            && self.covariance.iter().all(|value| value.is_finite())
    }
}
