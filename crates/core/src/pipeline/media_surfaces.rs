use image::RgbaImage;

use crate::shared::frame::Frame;
use crate::shared::size::Size;

/// The three buffers whose sizes the session keeps in sync: the stream's
/// native size, the overlay (sized to the rendered box) and the capture
/// buffer (sized to native).
pub struct MediaSurfaces {
    native: Option<Size>,
    overlay: RgbaImage,
    capture: Frame,
}

impl MediaSurfaces {
    pub fn new(native: Option<Size>, rendered: Size) -> Self {
        let rendered = rendered.at_least_one();
        Self {
            native,
            overlay: RgbaImage::new(rendered.width, rendered.height),
            capture: Frame::blank(native.unwrap_or_default()),
        }
    }

    pub fn native(&self) -> Option<Size> {
        self.native
    }

    /// Native size for geometry, substituting `fallback` while the stream has
    /// not reported a usable one.
    pub fn native_or(&self, fallback: Size) -> Size {
        self.native.filter(|s| !s.is_empty()).unwrap_or(fallback)
    }

    pub fn set_native(&mut self, native: Size) {
        if self.native == Some(native) {
            return;
        }
        log::debug!("Native size now {native}");
        self.native = Some(native);
        self.capture = Frame::blank(native);
    }

    pub fn overlay_size(&self) -> Size {
        Size::new(self.overlay.width(), self.overlay.height())
    }

    /// Resizes the overlay to the rendered box (clamped to one pixel).
    /// Resizing discards the drawing. Returns whether the size changed.
    pub fn resize_overlay(&mut self, rendered: Size) -> bool {
        let rendered = rendered.at_least_one();
        if rendered == self.overlay_size() {
            return false;
        }
        self.overlay = RgbaImage::new(rendered.width, rendered.height);
        true
    }

    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut RgbaImage {
        &mut self.overlay
    }

    pub fn capture(&self) -> &Frame {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut Frame {
        &mut self.capture
    }
}
