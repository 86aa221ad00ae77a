//! Object-cover mapping between native stream pixels, the display surface,
//! and the detector's normalized output.
//!
//! The native frame is scaled uniformly until it covers the whole display
//! surface, then centered; whatever overflows is cropped. Offsets are
//! therefore never positive.

use crate::geometry::domain::point::{DisplayPoint, NormalizedPoint};
use crate::shared::constants::{FALLBACK_NATIVE_HEIGHT, FALLBACK_NATIVE_WIDTH};
use crate::shared::size::Size;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoverTransform {
    pub scale: f64,
    pub content_width: f64,
    pub content_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Computes the cover transform of `native` content onto `display`.
///
/// A native size with a zero side (stream not negotiated yet) is replaced by
/// the 640x480 fallback; a zero display side is clamped to one pixel.
pub fn cover_transform(native: Size, display: Size) -> CoverTransform {
    let native = if native.is_empty() {
        Size::new(FALLBACK_NATIVE_WIDTH, FALLBACK_NATIVE_HEIGHT)
    } else {
        native
    };
    let display = display.at_least_one();

    let (nw, nh) = (native.width as f64, native.height as f64);
    let (dw, dh) = (display.width as f64, display.height as f64);

    let scale = (dw / nw).max(dh / nh);
    let content_width = nw * scale;
    let content_height = nh * scale;

    CoverTransform {
        scale,
        content_width,
        content_height,
        offset_x: (dw - content_width) / 2.0,
        offset_y: (dh - content_height) / 2.0,
    }
}

impl CoverTransform {
    pub fn to_display_space(&self, point: NormalizedPoint) -> DisplayPoint {
        DisplayPoint::new(
            self.offset_x + point.x * self.content_width,
            self.offset_y + point.y * self.content_height,
        )
    }

    /// Inverse of [`CoverTransform::to_display_space`].
    pub fn to_normalized(&self, point: DisplayPoint) -> NormalizedPoint {
        NormalizedPoint::new(
            (point.x - self.offset_x) / self.content_width,
            (point.y - self.offset_y) / self.content_height,
        )
    }
}

/// Free-function form used where a transform is passed around by reference.
pub fn to_display_space(point: NormalizedPoint, transform: &CoverTransform) -> DisplayPoint {
    transform.to_display_space(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_same_aspect_scales_without_offset() {
        let t = cover_transform(Size::new(640, 480), Size::new(320, 240));
        assert_relative_eq!(t.scale, 0.5);
        assert_relative_eq!(t.content_width, 320.0);
        assert_relative_eq!(t.content_height, 240.0);
        assert_relative_eq!(t.offset_x, 0.0);
        assert_relative_eq!(t.offset_y, 0.0);
    }

    #[test]
    fn test_wide_display_crops_top_and_bottom() {
        // 640x480 onto 800x400: scale = max(1.25, 0.833) = 1.25
        // content = 800x600, offset_y = (400 - 600) / 2 = -100
        let t = cover_transform(Size::new(640, 480), Size::new(800, 400));
        assert_relative_eq!(t.scale, 1.25);
        assert_relative_eq!(t.content_width, 800.0);
        assert_relative_eq!(t.content_height, 600.0);
        assert_relative_eq!(t.offset_x, 0.0);
        assert_relative_eq!(t.offset_y, -100.0);
    }

    #[test]
    fn test_tall_display_crops_sides() {
        // 640x480 onto 300x600: scale = max(0.469, 1.25) = 1.25
        // content = 800x600, offset_x = (300 - 800) / 2 = -250
        let t = cover_transform(Size::new(640, 480), Size::new(300, 600));
        assert_relative_eq!(t.offset_x, -250.0);
        assert_relative_eq!(t.offset_y, 0.0);
    }

    #[rstest]
    #[case::zero_width(Size::new(0, 720))]
    #[case::zero_height(Size::new(1280, 0))]
    #[case::both_zero(Size::new(0, 0))]
    fn test_unnegotiated_native_uses_fallback(#[case] native: Size) {
        let t = cover_transform(native, Size::new(640, 480));
        assert_eq!(t, cover_transform(Size::new(640, 480), Size::new(640, 480)));
        assert!(t.scale.is_finite());
    }

    #[test]
    fn test_zero_display_is_clamped_to_one_pixel() {
        let t = cover_transform(Size::new(640, 480), Size::new(0, 0));
        assert!(t.scale.is_finite() && t.scale > 0.0);
        assert!(t.content_width >= 1.0);
        assert!(t.content_height >= 1.0);
    }

    #[rstest]
    fn test_cover_never_underfills(
        #[values(Size::new(640, 480), Size::new(1280, 720), Size::new(480, 640), Size::new(1, 1), Size::new(1920, 1080))]
        native: Size,
        #[values(Size::new(320, 240), Size::new(1000, 300), Size::new(200, 900), Size::new(1, 1), Size::new(777, 333))]
        display: Size,
    ) {
        let t = cover_transform(native, display);
        let eps = 1e-9;
        assert!(t.content_width + eps >= display.width as f64);
        assert!(t.content_height + eps >= display.height as f64);
        assert!(t.offset_x <= eps);
        assert!(t.offset_y <= eps);
    }

    #[rstest]
    #[case(NormalizedPoint::new(0.0, 0.0))]
    #[case(NormalizedPoint::new(1.0, 1.0))]
    #[case(NormalizedPoint::new(0.37, 0.81))]
    #[case(NormalizedPoint::new(0.5, 0.02))]
    fn test_display_space_round_trip(#[case] p: NormalizedPoint) {
        let t = cover_transform(Size::new(1280, 720), Size::new(375, 667));
        let back = t.to_normalized(to_display_space(p, &t));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-12);
    }

    #[test]
    fn test_center_maps_to_display_center() {
        let t = cover_transform(Size::new(1280, 720), Size::new(400, 400));
        let c = t.to_display_space(NormalizedPoint::new(0.5, 0.5));
        assert_relative_eq!(c.x, 200.0);
        assert_relative_eq!(c.y, 200.0);
    }
}
