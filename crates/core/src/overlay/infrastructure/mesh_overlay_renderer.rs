use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::detection::domain::landmark_detector::LandmarkPoint;
use crate::detection::domain::topology::Topology;
use crate::geometry::domain::cover_transform::{to_display_space, CoverTransform};
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::shared::error::SendError;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Dot radius when the mesh lines are drawn too.
const MESH_POINT_RADIUS: i32 = 1;
/// Dot radius when there is no topology and points are all that is drawn.
const FALLBACK_POINT_RADIUS: i32 = 2;
/// Mapped coordinates past this magnitude are dropped before drawing.
const MAX_COORDINATE: f32 = 1_048_576.0;

/// White wireframe renderer: topology connections as 1 px lines plus a dot
/// per landmark.
///
/// Landmarks that map to non-finite or absurdly distant display coordinates
/// are dropped along with their connections. Everything else is handed to
/// `imageproc`, which clips to the surface.
#[derive(Clone, Debug)]
pub struct MeshOverlayRenderer {
    color: Rgba<u8>,
}

impl MeshOverlayRenderer {
    pub fn new() -> Self {
        Self { color: WHITE }
    }
}

impl Default for MeshOverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayRenderer for MeshOverlayRenderer {
    fn render(
        &mut self,
        surface: &mut RgbaImage,
        face: &[LandmarkPoint],
        topology: Option<&Topology>,
        transform: &CoverTransform,
    ) -> Result<(), SendError> {
        for pixel in surface.pixels_mut() {
            *pixel = TRANSPARENT;
        }
        if face.is_empty() {
            return Ok(());
        }

        let mapped: Vec<Option<(f32, f32)>> = face
            .iter()
            .map(|&p| {
                let d = to_display_space(p, transform);
                drawable(d.x as f32, d.y as f32)
            })
            .collect();

        let point_radius = match topology.filter(|t| !t.is_empty()) {
            Some(topology) => {
                let mut skipped = 0usize;
                for &(a, b) in topology.connections() {
                    match (mapped.get(a).copied().flatten(), mapped.get(b).copied().flatten()) {
                        (Some(start), Some(end)) => {
                            draw_line_segment_mut(surface, start, end, self.color);
                        }
                        _ => skipped += 1,
                    }
                }
                if skipped > 0 {
                    log::trace!(
                        "Skipped {skipped} undrawable connections on a {}-point face",
                        face.len()
                    );
                }
                MESH_POINT_RADIUS
            }
            None => FALLBACK_POINT_RADIUS,
        };

        let (width, height) = surface.dimensions();
        let margin = point_radius as f32;
        for &(x, y) in mapped.iter().flatten() {
            let outside = x < -margin
                || y < -margin
                || x > width as f32 + margin
                || y > height as f32 + margin;
            if outside {
                continue;
            }
            draw_filled_circle_mut(
                surface,
                (x.round() as i32, y.round() as i32),
                point_radius,
                self.color,
            );
        }
        Ok(())
    }
}

fn drawable(x: f32, y: f32) -> Option<(f32, f32)> {
    (x.is_finite() && y.is_finite() && x.abs() <= MAX_COORDINATE && y.abs() <= MAX_COORDINATE)
        .then_some((x, y))
}
