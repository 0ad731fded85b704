use color_eyre::{eyre::bail, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::field_dimensions::FieldDimensions;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelfLocatorParameters {
    pub number_of_hypotheses: usize,
    pub base_validity_weighting: f32,
    /// Length of the window over which validity is averaged.
    pub validity_frames: usize,
    pub mahalanobis_match_threshold: f32,
    /// Roll back updates that exceed the match threshold instead of keeping them.
    pub reject_outliers: bool,
    /// Resample every n-th cycle.
    pub resampling_interval: usize,
    pub maximum_cycles_at_weighting_floor: usize,
    // variances over (x, y, orientation)
    pub resampling_process_noise: Vector3<f32>,
    // standard deviations over (x, y, orientation)
    pub initial_pose_deviation: Vector3<f32>,
    pub initial_validity: f32,
    // [x, y, orientation], spread over the whole field if empty
    pub initial_poses: Vec<Vector3<f32>>,
    /// Converts rotational variance into positional units for ranking hypotheses (m²/rad²).
    pub combined_variance_rotation_factor: f32,
    pub center_circle_curvature_variance_factor: f32,
    pub ambiguity_window_cycles: usize,
    pub mirror_spawn_minimum_validity: f32,
    pub mirror_coverage_distance: f32,
    pub mirror_coverage_angle: f32,
    pub own_half_tolerance: f32,
    pub random_seed: u64,
}

impl SelfLocatorParameters {
    pub fn validate(&self) -> Result<()> {
        if self.number_of_hypotheses == 0 {
            bail!("number_of_hypotheses must be at least 1");
        }
        if self.validity_frames == 0 {
            bail!("validity_frames must be at least 1");
        }
        if self.resampling_interval == 0 {
            bail!("resampling_interval must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.base_validity_weighting) {
            bail!(
                "base_validity_weighting must be within [0, 1], got {}",
                self.base_validity_weighting
            );
        }
        if !(0.0..=1.0).contains(&self.initial_validity) {
            bail!(
                "initial_validity must be within [0, 1], got {}",
                self.initial_validity
            );
        }
        if !(self.mahalanobis_match_threshold.is_finite() && self.mahalanobis_match_threshold > 0.0)
        {
            bail!(
                "mahalanobis_match_threshold must be finite and positive, got {}",
                self.mahalanobis_match_threshold
            );
        }
        let non_negative_vectors = [
            ("resampling_process_noise", self.resampling_process_noise),
            ("initial_pose_deviation", self.initial_pose_deviation),
        ];
        for (name, vector) in non_negative_vectors {
            if vector.iter().any(|value| !value.is_finite() || *value < 0.0) {
                bail!("{name} must be finite and non-negative, got {vector:?}");
            }
        }
        if self
            .initial_poses
            .iter()
            .any(|pose| pose.iter().any(|value| !value.is_finite()))
        {
            bail!("initial_poses must be finite");
        }
        if !(self.combined_variance_rotation_factor.is_finite()
            && self.combined_variance_rotation_factor >= 0.0)
        {
            bail!("combined_variance_rotation_factor must be finite and non-negative");
        }
        if !(self.center_circle_curvature_variance_factor.is_finite()
            && self.center_circle_curvature_variance_factor >= 0.0)
        {
            bail!("center_circle_curvature_variance_factor must be finite and non-negative");
        }
        Ok(())
    }
}

impl Default for SelfLocatorParameters {
    fn default() -> Self {
        Self {
            number_of_hypotheses: 12,
            base_validity_weighting: 0.05,
            validity_frames: 60,
            mahalanobis_match_threshold: 3.0,
            reject_outliers: true,
            resampling_interval: 1,
            maximum_cycles_at_weighting_floor: 30,
            resampling_process_noise: Vector3::new(0.0001, 0.0001, 0.0001),
            initial_pose_deviation: Vector3::new(0.5, 0.5, 0.3),
            initial_validity: 0.5,
            initial_poses: Vec::new(),
            combined_variance_rotation_factor: 1.0,
            center_circle_curvature_variance_factor: 0.01,
            ambiguity_window_cycles: 300,
            mirror_spawn_minimum_validity: 0.5,
            mirror_coverage_distance: 0.5,
            mirror_coverage_angle: 0.5,
            own_half_tolerance: 0.3,
            random_seed: 42,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizationParameters {
    pub field_dimensions: FieldDimensions,
    pub self_locator: SelfLocatorParameters,
}
