use serde::{Deserialize, Serialize};

use crate::geometry::domain::cover_transform::CoverTransform;
use crate::geometry::domain::point::DisplayPoint;
use crate::shared::constants::{DEFAULT_POSITION, PROXIMITY_FACTOR};

/// Axis-aligned face box in display surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// Extrema of the given points, or `None` for an empty set.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = DisplayPoint>,
    {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => BoundingBox {
                    x_min: p.x,
                    y_min: p.y,
                    x_max: p.x,
                    y_max: p.y,
                },
                Some(b) => BoundingBox {
                    x_min: b.x_min.min(p.x),
                    y_min: b.y_min.min(p.y),
                    x_max: b.x_max.max(p.x),
                    y_max: b.y_max.max(p.y),
                },
            })
        })
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn center(&self) -> DisplayPoint {
        DisplayPoint::new(
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }
}

/// Face position summary attached to every capture.
///
/// `x`/`y` are the box center normalized against the content rectangle (the
/// whole native frame as laid out on the display), so they do not change when
/// the display is resized. `scale` is a proximity heuristic in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionData {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl PositionData {
    pub fn from_box(bbox: &BoundingBox, transform: &CoverTransform) -> Self {
        let center = transform.to_normalized(bbox.center());
        let scale = (bbox.width() / transform.content_width * PROXIMITY_FACTOR).min(1.0);
        Self {
            x: center.x,
            y: center.y,
            scale,
        }
    }

    /// Position reported when no face box is known.
    pub fn centered_default() -> Self {
        let (x, y, scale) = DEFAULT_POSITION;
        Self { x, y, scale }
    }
}
