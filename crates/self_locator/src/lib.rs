mod hypothesis;
mod hypothesis_predicter;
mod measurement_dispatcher;
mod population;
mod symmetry_resolver;

pub use hypothesis::{HypothesisId, PoseHypothesis};
pub use hypothesis_predicter::HypothesisPredicter;
pub use measurement_dispatcher::{well_formed_measurements, MatchReport, MeasurementDispatcher};
pub use population::{HypothesisPopulation, ResamplingError};
pub use symmetry_resolver::{SymmetryOutcome, SymmetryResolver};
