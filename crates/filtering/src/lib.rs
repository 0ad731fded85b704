use thiserror::Error;

pub mod covariance;
pub mod kalman_filter;
pub mod pose_filter;

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("covariance is not positive definite, sigma points cannot be generated")]
    SigmaPointsUnavailable,
    #[error("innovation covariance is singular")]
    SingularInnovationCovariance,
    #[error("updated covariance is not positive semi-definite")]
    NotPositiveSemiDefinite,
    #[error("measurement is degenerate")]
    DegenerateMeasurement,
}
