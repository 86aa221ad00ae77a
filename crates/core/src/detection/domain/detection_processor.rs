use crate::detection::domain::landmark_detector::LandmarkPoint;
use crate::geometry::domain::bounding_box::{BoundingBox, PositionData};
use crate::geometry::domain::cover_transform::{cover_transform, CoverTransform};
use crate::shared::constants::MIN_READY_SCALE;
use crate::shared::size::Size;
use crate::status::domain::pipeline_status::PipelineStatus;

/// What one tick produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutcome {
    pub bounding_box: Option<BoundingBox>,
    pub position: Option<PositionData>,
    pub status: PipelineStatus,
    /// Transform the points were mapped with; also used by the renderer.
    pub transform: CoverTransform,
}

/// Turns the first face's landmarks into a display-space box, a position
/// summary and a status. Stateless across ticks; no hysteresis.
#[derive(Clone, Copy, Debug)]
pub struct DetectionProcessor {
    min_ready_scale: f64,
}

impl DetectionProcessor {
    pub fn new() -> Self {
        Self {
            min_ready_scale: MIN_READY_SCALE,
        }
    }

    pub fn process(&self, points: &[LandmarkPoint], native: Size, display: Size) -> TickOutcome {
        let transform = cover_transform(native, display);
        let bounding_box =
            BoundingBox::enclosing(points.iter().map(|&p| transform.to_display_space(p)));

        match bounding_box {
            None => TickOutcome {
                bounding_box: None,
                position: None,
                status: PipelineStatus::NoFace,
                transform,
            },
            Some(bbox) => {
                let position = PositionData::from_box(&bbox, &transform);
                TickOutcome {
                    bounding_box: Some(bbox),
                    position: Some(position),
                    status: self.classify(position.scale),
                    transform,
                }
            }
        }
    }

    /// `scale` below the threshold is too far; the threshold itself is ready.
    pub fn classify(&self, scale: f64) -> PipelineStatus {
        if scale < self.min_ready_scale {
            PipelineStatus::TooFar
        } else {
            PipelineStatus::Ready
        }
    }
}

impl Default for DetectionProcessor {
    fn default() -> Self {
        Self::new()
    }
}
