use image::RgbaImage;

use crate::detection::domain::landmark_detector::LandmarkPoint;
use crate::detection::domain::topology::Topology;
use crate::geometry::domain::cover_transform::CoverTransform;
use crate::shared::error::SendError;

/// Draws one tick's face onto the overlay surface.
///
/// Implementations clear the whole surface to transparent first, so an empty
/// `face` leaves a blank overlay.
pub trait OverlayRenderer: Send {
    fn render(
        &mut self,
        surface: &mut RgbaImage,
        face: &[LandmarkPoint],
        topology: Option<&Topology>,
        transform: &CoverTransform,
    ) -> Result<(), SendError>;
}
