use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::detection::domain::topology::Topology;
use crate::geometry::domain::point::NormalizedPoint;
use crate::shared::asset_resolver::AssetSpec;
use crate::shared::constants::{DEFAULT_MIN_DETECTION_CONFIDENCE, DEFAULT_MIN_TRACKING_CONFIDENCE};
use crate::shared::error::SendError;
use crate::shared::frame::Frame;

/// Detector output point: `(x, y)` in `[0, 1]` relative to the native frame.
pub type LandmarkPoint = NormalizedPoint;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    pub max_faces: usize,
    pub refine_landmarks: bool,
    pub min_detection_confidence: f64,
    pub min_tracking_confidence: f64,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_tracking_confidence: DEFAULT_MIN_TRACKING_CONFIDENCE,
        }
    }
}

/// One processed frame: zero or more faces plus the connection table used to
/// draw them, when the detector provides one.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    pub faces: Vec<Vec<LandmarkPoint>>,
    pub topology: Option<Arc<Topology>>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Points of the first face, or an empty slice.
    pub fn first_face(&self) -> &[LandmarkPoint] {
        self.faces.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Domain interface for the landmark model.
///
/// Implementations may track across frames, hence `&mut self`.
pub trait LandmarkDetector: Send {
    fn process(&mut self, frame: &Frame) -> Result<DetectionResult, SendError>;
}

/// Declares the runtime assets a detector needs and builds it once they are
/// on disk.
pub trait DetectorFactory: Send + Sync {
    fn required_assets(&self) -> Vec<AssetSpec>;

    /// `assets` holds the resolved paths in the order of [`required_assets`].
    ///
    /// [`required_assets`]: DetectorFactory::required_assets
    fn create(
        &self,
        assets: &[PathBuf],
        options: &DetectorOptions,
    ) -> Result<Box<dyn LandmarkDetector>, SendError>;
}
