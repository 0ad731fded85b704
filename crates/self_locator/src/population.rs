use std::{cmp::Ordering, f32::consts::PI};

use log::debug;
use nalgebra::{vector, Matrix3, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use types::field_dimensions::FieldDimensions;

use crate::hypothesis::{HypothesisId, PoseHypothesis};

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ResamplingError {
    #[error("no hypothesis is selectable for resampling")]
    Collapsed,
}

/// Fixed-size set of pose hypotheses. Hypotheses are held by value, copies never alias.
#[derive(Clone, Debug)]
pub struct HypothesisPopulation {
    hypotheses: Vec<PoseHypothesis>,
    size: usize,
    next_id: HypothesisId,
    random_number_generator: StdRng,
}

impl HypothesisPopulation {
    pub fn new(size: usize, random_seed: u64) -> Self {
        Self {
            hypotheses: Vec::with_capacity(size),
            size,
            next_id: 0,
            random_number_generator: StdRng::seed_from_u64(random_seed),
        }
    }

    pub fn hypotheses(&self) -> &[PoseHypothesis] {
        &self.hypotheses
    }

    pub fn hypotheses_mut(&mut self) -> &mut [PoseHypothesis] {
        &mut self.hypotheses
    }

    pub fn find(&self, id: HypothesisId) -> Option<&PoseHypothesis> {
        self.hypotheses.iter().find(|hypothesis| hypothesis.id() == id)
    }

    pub fn next_id(&mut self) -> HypothesisId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Replaces all hypotheses. Poses are cycled if fewer than the population size are given,
    /// an empty slice spreads the hypotheses uniformly over the carpet.
    pub fn reinitialize(
        &mut self,
        poses: &[Vector3<f32>],
        pose_deviation: Vector3<f32>,
        validity: f32,
        field_dimensions: &FieldDimensions,
    ) {
        let poses: Vec<_> = if poses.is_empty() {
            let half_length = field_dimensions.length / 2.0 + field_dimensions.border_strip_width;
            let half_width = field_dimensions.width / 2.0 + field_dimensions.border_strip_width;
            (0..self.size)
                .map(|_| {
                    vector![
                        self.random_number_generator
                            .gen_range(-half_length..=half_length),
                        self.random_number_generator.gen_range(-half_width..=half_width),
                        self.random_number_generator.gen_range(-PI..=PI)
                    ]
                })
                .collect()
        } else {
            poses.iter().copied().cycle().take(self.size).collect()
        };

        let mut hypotheses = Vec::with_capacity(self.size);
        for pose in poses {
            hypotheses.push(PoseHypothesis::new(
                pose,
                pose_deviation,
                self.next_id(),
                validity,
            ));
        }
        self.hypotheses = hypotheses;
        debug!("reinitialized {} hypotheses", self.hypotheses.len());
    }

    pub fn compute_weightings(&mut self, base_validity_weighting: f32) {
        for hypothesis in self.hypotheses.iter_mut() {
            hypothesis.compute_weighting_based_on_validity(base_validity_weighting);
        }
    }

    /// Stochastic universal sampling over the weightings. Every slot becomes a copy of its parent
    /// with a fresh id and `process_noise` (variances) added to the covariance. Hypotheses starved
    /// at the weighting floor for more than `maximum_cycles_at_weighting_floor` are never
    /// selected.
    pub fn resample(
        &mut self,
        maximum_cycles_at_weighting_floor: usize,
        process_noise: Vector3<f32>,
    ) -> Result<(), ResamplingError> {
        let selectable: Vec<_> = self
            .hypotheses
            .iter()
            .filter(|hypothesis| {
                hypothesis.cycles_at_weighting_floor() <= maximum_cycles_at_weighting_floor
                    && hypothesis.weighting().is_finite()
                    && hypothesis.weighting() > 0.0
                    && hypothesis.is_finite()
            })
            .copied()
            .collect();
        let total_weighting: f32 = selectable
            .iter()
            .map(|hypothesis| hypothesis.weighting())
            .sum();
        if selectable.is_empty() || total_weighting <= 0.0 {
            return Err(ResamplingError::Collapsed);
        }

        let step = total_weighting / self.size as f32;
        let mut pointer = self.random_number_generator.gen::<f32>() * step;
        let mut parent_index = 0;
        let mut cumulative_weighting = selectable[0].weighting();
        let noise = Matrix3::from_diagonal(&process_noise);

        let mut resampled = Vec::with_capacity(self.size);
        for _ in 0..self.size {
            while pointer > cumulative_weighting && parent_index + 1 < selectable.len() {
                parent_index += 1;
                cumulative_weighting += selectable[parent_index].weighting();
            }
            let mut child = selectable[parent_index].with_id(self.next_id());
            child.diversify(noise);
            resampled.push(child);
            pointer += step;
        }
        self.hypotheses = resampled;
        Ok(())
    }

    /// Highest validity among finite hypotheses, ties broken by the smallest combined variance and
    /// then the oldest id. Unconfirmed mirrored companions are only chosen if nothing else is left.
    pub fn best(&self, rotation_factor: f32) -> Option<&PoseHypothesis> {
        self.hypotheses
            .iter()
            .filter(|hypothesis| hypothesis.is_finite())
            .max_by(|left, right| {
                right
                    .is_unconfirmed_mirror()
                    .cmp(&left.is_unconfirmed_mirror())
                    .then_with(|| left.validity().total_cmp(&right.validity()))
                    .then_with(|| {
                        right
                            .combined_variance(rotation_factor)
                            .total_cmp(&left.combined_variance(rotation_factor))
                    })
                    .then_with(|| right.id().cmp(&left.id()))
            })
    }

    /// Every hypothesis is either invalidated or starved at the weighting floor.
    pub fn is_collapsed(&self, maximum_cycles_at_weighting_floor: usize) -> bool {
        self.hypotheses.iter().all(|hypothesis| {
            hypothesis.validity() <= 0.0
                || hypothesis.cycles_at_weighting_floor() > maximum_cycles_at_weighting_floor
                || !hypothesis.is_finite()
        })
    }

    /// Replaces the worst-ranked hypothesis not listed in `protected_ids` with `hypothesis`.
    /// Returns the evicted id, or `None` if every hypothesis is protected and nothing was
    /// inserted.
    pub fn insert_evicting_worst(
        &mut self,
        hypothesis: PoseHypothesis,
        protected_ids: &[HypothesisId],
        rotation_factor: f32,
    ) -> Option<HypothesisId> {
        let worst_index = self
            .hypotheses
            .iter()
            .enumerate()
            .filter(|(_, candidate)| !protected_ids.contains(&candidate.id()))
            .min_by(|(_, left), (_, right)| rank(left, right, rotation_factor))
            .map(|(index, _)| index)?;
        let evicted = std::mem::replace(&mut self.hypotheses[worst_index], hypothesis);
        Some(evicted.id())
    }
}

fn rank(left: &PoseHypothesis, right: &PoseHypothesis, rotation_factor: f32) -> Ordering {
    left.weighting().total_cmp(&right.weighting()).then_with(|| {
        right
            .combined_variance(rotation_factor)
            .total_cmp(&left.combined_variance(rotation_factor))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use approx::assert_relative_eq;

    use super::*;

    fn deviation() -> Vector3<f32> {
        vector![0.1, 0.1, 0.05]
    }

    fn population_with_validities(validities: &[f32]) -> HypothesisPopulation {
        let mut population = HypothesisPopulation::new(validities.len(), 1);
        let poses: Vec<_> = (0..validities.len())
            .map(|index| vector![index as f32, 0.0, 0.0])
            .collect();
        population.reinitialize(&poses, deviation(), 1.0, &FieldDimensions::default());
        for (hypothesis, validity) in population.hypotheses_mut().iter_mut().zip(validities) {
            hypothesis.update_validity(1, *validity);
        }
        population.compute_weightings(0.05);
        population
    }

    #[test]
    fn weightings_are_floored_validities() {
        let population = population_with_validities(&[1.0, 0.0, 0.5, 0.2]);
        let weightings: Vec<_> = population
            .hypotheses()
            .iter()
            .map(|hypothesis| hypothesis.weighting())
            .collect();
        assert_eq!(weightings, vec![1.0, 0.05, 0.5, 0.2]);
    }

    #[test]
    fn resampling_preserves_size_and_assigns_fresh_ids() {
        let mut population = population_with_validities(&[1.0, 0.0, 0.5, 0.2]);
        let old_ids: HashSet<_> = population.hypotheses().iter().map(|h| h.id()).collect();

        population.resample(100, vector![0.001, 0.001, 0.001]).unwrap();

        let new_ids: HashSet<_> = population.hypotheses().iter().map(|h| h.id()).collect();
        assert_eq!(population.hypotheses().len(), 4);
        assert_eq!(new_ids.len(), 4);
        assert!(old_ids.is_disjoint(&new_ids));
    }

    #[test]
    fn resampled_copies_are_diversified() {
        let mut population = population_with_validities(&[1.0]);
        let variance_before = population.hypotheses()[0].covariance()[(0, 0)];
        population.resample(100, vector![0.01, 0.0, 0.0]).unwrap();
        assert_relative_eq!(
            population.hypotheses()[0].covariance()[(0, 0)],
            variance_before + 0.01
        );
    }

    #[test]
    fn selection_frequency_follows_weighting_share() {
        let mut copies_of_first = 0;
        let mut total_slots = 0;
        for seed in 0..2000 {
            let mut population = population_with_validities(&[1.0, 0.0, 0.5, 0.2]);
            population.random_number_generator = StdRng::seed_from_u64(seed);
            population.resample(100, Vector3::zeros()).unwrap();
            copies_of_first += population
                .hypotheses()
                .iter()
                .filter(|hypothesis| hypothesis.pose().x == 0.0)
                .count();
            total_slots += population.hypotheses().len();
        }
        let frequency = copies_of_first as f32 / total_slots as f32;
        assert_relative_eq!(frequency, 1.0 / 1.75, epsilon = 0.02);
    }

    #[test]
    fn starved_hypotheses_are_not_selected() {
        let mut population = population_with_validities(&[1.0, 0.0]);
        for _ in 0..5 {
            population.compute_weightings(0.05);
        }
        population.resample(3, Vector3::zeros()).unwrap();
        assert!(population
            .hypotheses()
            .iter()
            .all(|hypothesis| hypothesis.pose().x == 0.0));
    }

    #[test]
    fn resampling_without_selectable_hypotheses_reports_collapse() {
        let mut population = population_with_validities(&[0.0, 0.0]);
        for _ in 0..5 {
            population.compute_weightings(0.05);
        }
        let before: Vec<_> = population.hypotheses().to_vec();

        assert!(population.is_collapsed(3));
        assert_eq!(
            population.resample(3, Vector3::zeros()),
            Err(ResamplingError::Collapsed)
        );
        assert_eq!(population.hypotheses(), before.as_slice());
    }

    #[test]
    fn best_prefers_validity_then_smaller_variance() {
        let mut population = population_with_validities(&[0.5, 0.9, 0.9]);
        population.hypotheses_mut()[1].diversify(Matrix3::identity());
        let best = population.best(1.0).unwrap();
        assert_eq!(best.pose().x, 2.0);
    }

    #[test]
    fn best_never_prefers_an_unconfirmed_companion() {
        let mut population = population_with_validities(&[0.9, 0.3, 0.1]);
        let parent = population.hypotheses()[0];
        let companion = parent.mirrored_companion(population.next_id());
        let protected = [parent.id()];
        population.insert_evicting_worst(companion, &protected, 1.0);

        assert_eq!(population.best(1.0).unwrap().id(), parent.id());

        population.hypotheses_mut()[2].confirm();
        assert_eq!(population.best(1.0).unwrap().id(), parent.id());
    }

    #[test]
    fn best_ignores_non_finite_hypotheses() {
        let mut population = population_with_validities(&[0.9, 0.3, 0.1]);
        population.hypotheses_mut()[0].diversify(Matrix3::from_element(f32::NAN));
        let expected = population.hypotheses()[1].id();

        assert_eq!(population.best(1.0).unwrap().id(), expected);

        for hypothesis in population.hypotheses_mut() {
            hypothesis.diversify(Matrix3::from_element(f32::INFINITY));
        }
        assert!(population.best(1.0).is_none());
    }

    #[test]
    fn best_after_reinitialization_is_one_of_the_given_poses() {
        let poses = [vector![-3.2, -3.0, PI / 2.0], vector![3.2, 3.0, -PI / 2.0]];
        let mut population = HypothesisPopulation::new(5, 3);
        population.reinitialize(&poses, deviation(), 0.5, &FieldDimensions::default());

        assert_eq!(population.hypotheses().len(), 5);
        let best = population.best(1.0).unwrap().pose();
        assert!(poses.contains(&best));
    }

    #[test]
    fn uniform_reinitialization_stays_on_carpet() {
        let field_dimensions = FieldDimensions::default();
        let mut population = HypothesisPopulation::new(50, 5);
        population.reinitialize(&[], deviation(), 0.5, &field_dimensions);

        assert_eq!(population.hypotheses().len(), 50);
        for hypothesis in population.hypotheses() {
            let pose = hypothesis.pose();
            assert!(field_dimensions.is_inside_carpet(pose.xy().into()));
            assert!(pose.z > -PI && pose.z <= PI);
        }
    }

    #[test]
    fn ids_are_never_reused() {
        let mut population = HypothesisPopulation::new(3, 0);
        population.reinitialize(&[], deviation(), 0.5, &FieldDimensions::default());
        let first: HashSet<_> = population.hypotheses().iter().map(|h| h.id()).collect();
        population.reinitialize(&[], deviation(), 0.5, &FieldDimensions::default());
        let second: HashSet<_> = population.hypotheses().iter().map(|h| h.id()).collect();
        assert!(first.is_disjoint(&second));
    }

    #[test]
    fn eviction_replaces_worst_unprotected_hypothesis() {
        let mut population = population_with_validities(&[1.0, 0.1, 0.3]);
        let protected = [population.hypotheses()[1].id()];
        let expected_eviction = population.hypotheses()[2].id();
        let newcomer = PoseHypothesis::new(vector![9.0, 0.0, 0.0], deviation(), 99, 0.7);

        let evicted = population.insert_evicting_worst(newcomer, &protected, 1.0);

        assert_eq!(evicted, Some(expected_eviction));
        assert_eq!(population.hypotheses().len(), 3);
        assert!(population.find(99).is_some());
        assert!(population.find(protected[0]).is_some());
    }

    #[test]
    fn eviction_fails_when_everything_is_protected() {
        let mut population = population_with_validities(&[1.0, 0.1]);
        let protected: Vec<_> = population.hypotheses().iter().map(|h| h.id()).collect();
        let newcomer = PoseHypothesis::new(vector![9.0, 0.0, 0.0], deviation(), 99, 0.7);

        assert_eq!(population.insert_evicting_worst(newcomer, &protected, 1.0), None);
        assert!(population.find(99).is_none());
    }
}
