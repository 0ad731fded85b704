use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use self_locator::{
    HypothesisPopulation, MeasurementDispatcher, PoseHypothesis, SymmetryResolver,
};
use types::{
    odometry::OdometryDelta, parameters::LocalizationParameters,
    registered_measurements::RegisteredMeasurement, robot_pose::EstimatedRobotPose,
    side_information::SideInformation,
};

pub struct Localization {
    population: HypothesisPopulation,
    measurement_dispatcher: MeasurementDispatcher,
    symmetry_resolver: SymmetryResolver,
    parameters: LocalizationParameters,
    cycles_since_resampling: usize,
    last_known_good_pose: EstimatedRobotPose,
}

pub struct CreationContext<'a> {
    pub parameters: &'a LocalizationParameters,
}

pub struct CycleContext<'a> {
    pub odometry: OdometryDelta,
    pub measurements: &'a [RegisteredMeasurement],
    pub side_information: Option<SideInformation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MainOutputs {
    pub robot_pose: EstimatedRobotPose,
    pub pose_hypotheses: Vec<PoseHypothesis>,
}

impl Localization {
    pub fn new(context: CreationContext) -> Result<Self> {
        let parameters = context.parameters.clone();
        parameters
            .self_locator
            .validate()
            .wrap_err("invalid self locator parameters")?;

        let self_locator = &parameters.self_locator;
        let mut population =
            HypothesisPopulation::new(self_locator.number_of_hypotheses, self_locator.random_seed);
        population.reinitialize(
            &self_locator.initial_poses,
            self_locator.initial_pose_deviation,
            self_locator.initial_validity,
            &parameters.field_dimensions,
        );
        let last_known_good_pose = population
            .best(self_locator.combined_variance_rotation_factor)
            .map(PoseHypothesis::estimated_pose)
            .ok_or_else(|| eyre!("population is empty after initialization"))?;

        Ok(Self {
            measurement_dispatcher: MeasurementDispatcher::new(
                self_locator,
                &parameters.field_dimensions,
            ),
            symmetry_resolver: SymmetryResolver::new(self_locator),
            population,
            cycles_since_resampling: 0,
            last_known_good_pose,
            parameters,
        })
    }

    pub fn cycle(&mut self, context: CycleContext) -> Result<MainOutputs> {
        let parameters = &self.parameters.self_locator;

        let odometry = if is_finite(&context.odometry) {
            context.odometry
        } else {
            warn!("ignoring non-finite odometry {:?}", context.odometry);
            OdometryDelta::stationary()
        };
        let reports =
            self.measurement_dispatcher
                .dispatch(&mut self.population, &odometry, context.measurements);
        self.population
            .compute_weightings(parameters.base_validity_weighting);
        self.symmetry_resolver.resolve(
            &mut self.population,
            &reports,
            context.side_information.as_ref(),
        );

        self.cycles_since_resampling += 1;
        if self
            .population
            .is_collapsed(parameters.maximum_cycles_at_weighting_floor)
        {
            warn!("all pose hypotheses collapsed, reinitializing over the whole field");
            self.reinitialize_globally();
        } else if self.cycles_since_resampling >= parameters.resampling_interval {
            self.cycles_since_resampling = 0;
            if let Err(error) = self.population.resample(
                parameters.maximum_cycles_at_weighting_floor,
                parameters.resampling_process_noise,
            ) {
                warn!("{error}, reinitializing over the whole field");
                self.reinitialize_globally();
            }
        }

        Ok(MainOutputs {
            robot_pose: self.select_robot_pose(),
            pose_hypotheses: self.population.hypotheses().to_vec(),
        })
    }

    fn reinitialize_globally(&mut self) {
        let parameters = &self.parameters.self_locator;
        self.population.reinitialize(
            &[],
            parameters.initial_pose_deviation,
            parameters.initial_validity,
            &self.parameters.field_dimensions,
        );
        self.symmetry_resolver.reset();
        self.cycles_since_resampling = 0;
        info!(
            "reinitialized {} pose hypotheses",
            self.population.hypotheses().len()
        );
    }

    fn select_robot_pose(&mut self) -> EstimatedRobotPose {
        let best = self
            .population
            .best(self.parameters.self_locator.combined_variance_rotation_factor);
        match best {
            Some(hypothesis) => {
                self.last_known_good_pose = hypothesis.estimated_pose();
            }
            None => {
                error!("no finite pose hypothesis available, publishing last known good pose");
            }
        }
        self.last_known_good_pose
    }

    pub fn hypotheses(&self) -> &[PoseHypothesis] {
        self.population.hypotheses()
    }
}

fn is_finite(odometry: &OdometryDelta) -> bool {
    odometry
        .current_odometry_to_last_odometry
        .translation
        .vector
        .iter()
        .all(|value| value.is_finite())
        && odometry
            .current_odometry_to_last_odometry
            .rotation
            .angle()
            .is_finite()
        && odometry.covariance.iter().all(|value| value.is_finite())
}
