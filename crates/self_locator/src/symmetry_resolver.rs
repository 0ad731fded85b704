use log::{debug, info};
use nalgebra::Vector3;

use geometry::angle::angle_difference;
use types::{parameters::SelfLocatorParameters, side_information::SideInformation};

use crate::{
    hypothesis::HypothesisId, measurement_dispatcher::MatchReport, HypothesisPopulation,
};

/// The field is point-symmetric, so every confident pose has an equally plausible twin rotated by
/// 180° around the center. Shortly after (re)initialization the resolver keeps that twin alive
/// until side information or diverging evidence settles which one is right.
#[derive(Clone, Debug, PartialEq)]
pub struct SymmetryResolver {
    cycles_since_initialization: usize,
    ambiguity_window_cycles: usize,
    minimum_validity: f32,
    coverage_distance: f32,
    coverage_angle: f32,
    own_half_tolerance: f32,
    rotation_factor: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymmetryOutcome {
    /// (parent, companion) pairs
    pub spawned_companions: Vec<(HypothesisId, HypothesisId)>,
    pub mirrored_into_own_half: Vec<HypothesisId>,
}

impl SymmetryResolver {
    pub fn new(parameters: &SelfLocatorParameters) -> Self {
        Self {
            cycles_since_initialization: 0,
            ambiguity_window_cycles: parameters.ambiguity_window_cycles,
            minimum_validity: parameters.mirror_spawn_minimum_validity,
            coverage_distance: parameters.mirror_coverage_distance,
            coverage_angle: parameters.mirror_coverage_angle,
            own_half_tolerance: parameters.own_half_tolerance,
            rotation_factor: parameters.combined_variance_rotation_factor,
        }
    }

    /// Reopens the ambiguity window, called after every (re)initialization.
    pub fn reset(&mut self) {
        self.cycles_since_initialization = 0;
    }

    pub fn is_ambiguity_window_open(&self) -> bool {
        self.cycles_since_initialization < self.ambiguity_window_cycles
    }

    pub fn resolve(
        &mut self,
        population: &mut HypothesisPopulation,
        reports: &[MatchReport],
        side_information: Option<&SideInformation>,
    ) -> SymmetryOutcome {
        let mut outcome = SymmetryOutcome::default();
        match side_information {
            Some(side_information) if side_information.robot_must_be_in_own_half => {
                outcome.mirrored_into_own_half = self.mirror_into_own_half(population);
            }
            _ if self.is_ambiguity_window_open() => {
                outcome.spawned_companions = self.spawn_companions(population, reports);
            }
            _ => {}
        }
        self.cycles_since_initialization = self.cycles_since_initialization.saturating_add(1);
        outcome
    }

    fn mirror_into_own_half(&self, population: &mut HypothesisPopulation) -> Vec<HypothesisId> {
        population
            .hypotheses_mut()
            .iter_mut()
            .filter(|hypothesis| hypothesis.pose().x > self.own_half_tolerance)
            .map(|hypothesis| {
                hypothesis.mirror();
                debug!("mirrored hypothesis {} into own half", hypothesis.id());
                hypothesis.id()
            })
            .collect()
    }

    fn spawn_companions(
        &self,
        population: &mut HypothesisPopulation,
        reports: &[MatchReport],
    ) -> Vec<(HypothesisId, HypothesisId)> {
        let mut parents: Vec<_> = population
            .hypotheses()
            .iter()
            .filter(|hypothesis| {
                hypothesis.validity() >= self.minimum_validity
                    && reports
                        .iter()
                        .any(|report| report.id == hypothesis.id() && report.matched > 0)
            })
            .map(|hypothesis| (hypothesis.id(), hypothesis.validity()))
            .collect();
        parents.sort_by(|(_, left), (_, right)| right.total_cmp(left));

        let mut protected_ids = Vec::new();
        let mut spawned = Vec::new();
        for (parent_id, _) in parents {
            let Some(parent) = population.find(parent_id).copied() else {
                continue;
            };
            let mut mirrored = parent;
            mirrored.mirror();
            if self.is_covered(population, mirrored.pose()) {
                continue;
            }

            let companion = parent.mirrored_companion(population.next_id());
            protected_ids.push(parent_id);
            let evicted =
                population.insert_evicting_worst(companion, &protected_ids, self.rotation_factor);
            match evicted {
                Some(evicted_id) => {
                    info!(
                        "spawned mirrored companion {} of hypothesis {parent_id}, \
                         evicting {evicted_id}",
                        companion.id()
                    );
                    protected_ids.push(companion.id());
                    spawned.push((parent_id, companion.id()));
                }
                None => break,
            }
        }
        spawned
    }

    fn is_covered(&self, population: &HypothesisPopulation, pose: Vector3<f32>) -> bool {
        population.hypotheses().iter().any(|hypothesis| {
            let other = hypothesis.pose();
            (other.xy() - pose.xy()).norm() <= self.coverage_distance
                && angle_difference(other.z, pose.z).abs() <= self.coverage_angle
        })
    }
}
