use crate::detection::domain::landmark_detector::LandmarkPoint;
use crate::detection::domain::topology::Topology;

/// Consumer of one detection tick.
///
/// `points` are the first face's landmarks (empty when no face was found).
pub trait DetectionResultHandler {
    fn on_result(&mut self, points: &[LandmarkPoint], topology: Option<&Topology>);
}
