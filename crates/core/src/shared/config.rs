use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::domain::camera::StreamConstraints;
use crate::detection::domain::landmark_detector::DetectorOptions;
use crate::detection::domain::topology::{Topology, TopologyError, TopologySource};
use crate::shared::asset_resolver::AssetSpec;
use crate::shared::constants::{
    DEFAULT_BATCH_DELAY_MS, DEFAULT_BATCH_SIZE, DEFAULT_METADATA_TIMEOUT_MS,
    DEFAULT_TICK_INTERVAL_MS, FACE_DETECTION_MODEL_NAME, FACE_LANDMARK_MODEL_NAME,
    FALLBACK_NATIVE_HEIGHT, FALLBACK_NATIVE_WIDTH, JPEG_QUALITY,
};
use crate::shared::size::Size;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Session configuration. Every field has a default, so a config file only
/// needs the keys it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub detector: DetectorOptions,
    pub camera: StreamConstraints,
    pub tick_interval_ms: u64,
    pub metadata_timeout_ms: u64,
    /// Native size assumed while the stream has not reported one.
    pub fallback_native: Size,
    pub jpeg_quality: u8,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub face_detection_model: AssetSpec,
    pub face_landmark_model: AssetSpec,
    pub mesh_style: MeshStyle,
    /// Replaces the built-in mesh when set.
    pub topology_path: Option<PathBuf>,
}

/// Built-in wireframe drawn over the face.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshStyle {
    /// Triangulated mesh across the whole face.
    #[default]
    Tessellation,
    /// Face oval, lips and eyes only.
    Contours,
    /// Landmark dots without connections.
    Points,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            detector: DetectorOptions::default(),
            camera: StreamConstraints::default(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            metadata_timeout_ms: DEFAULT_METADATA_TIMEOUT_MS,
            fallback_native: Size::new(FALLBACK_NATIVE_WIDTH, FALLBACK_NATIVE_HEIGHT),
            jpeg_quality: JPEG_QUALITY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            face_detection_model: bundled_model(FACE_DETECTION_MODEL_NAME),
            face_landmark_model: bundled_model(FACE_LANDMARK_MODEL_NAME),
            mesh_style: MeshStyle::default(),
            topology_path: None,
        }
    }
}

fn bundled_model(name: &str) -> AssetSpec {
    AssetSpec {
        bundled_dir: Some(PathBuf::from("models")),
        ..AssetSpec::named(name)
    }
}

impl CaptureConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.max_faces != 1 {
            return Err(ConfigError::Invalid(format!(
                "detector.max_faces must be 1, got {}",
                self.detector.max_faces
            )));
        }
        for (name, value) in [
            ("min_detection_confidence", self.detector.min_detection_confidence),
            ("min_tracking_confidence", self.detector.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "detector.{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".into()));
        }
        if self.fallback_native.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "fallback_native must be non-empty, got {}",
                self.fallback_native
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Connection table for the detector: `topology_path` if set, otherwise
    /// the built-in `mesh_style`.
    pub fn topology_source(&self) -> Result<TopologySource, TopologyError> {
        if let Some(path) = &self.topology_path {
            return Ok(TopologySource::fixed(Topology::load(path)?));
        }
        Ok(match self.mesh_style {
            MeshStyle::Tessellation => TopologySource::tessellated(),
            MeshStyle::Contours => TopologySource::fixed(Topology::contours()),
            MeshStyle::Points => TopologySource::PointsOnly,
        })
    }
}
