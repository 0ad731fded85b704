use types::odometry::OdometryDelta;

use crate::HypothesisPopulation;

pub trait HypothesisPredicter {
    fn predict(&mut self, odometry: &OdometryDelta);
}

impl HypothesisPredicter for HypothesisPopulation {
    fn predict(&mut self, odometry: &OdometryDelta) {
        for hypothesis in self.hypotheses_mut().iter_mut() {
            hypothesis.predict(odometry)
        }
    }
}
