pub mod field_dimensions;
pub mod multivariate_normal_distribution;
pub mod odometry;
pub mod parameters;
pub mod registered_measurements;
pub mod robot_pose;
pub mod side_information;
