use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use image::RgbaImage;

use crate::capture::domain::camera::MediaStream;
use crate::capture::domain::capture_record::CaptureRecord;
use crate::capture::domain::frame_encoder::FrameEncoder;
use crate::detection::domain::detection_processor::DetectionProcessor;
use crate::detection::domain::landmark_detector::LandmarkPoint;
use crate::detection::domain::result_handler::DetectionResultHandler;
use crate::detection::domain::topology::Topology;
use crate::display::domain::display_host::{DisplayEvent, DisplayHost};
use crate::geometry::domain::bounding_box::{BoundingBox, PositionData};
use crate::geometry::domain::cover_transform::cover_transform;
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::pipeline::media_surfaces::MediaSurfaces;
use crate::pipeline::session_logger::SessionLogger;
use crate::shared::size::Size;
use crate::status::domain::pipeline_status::{PipelineStatus, StatusBoard};

/// Collaborators the context talks to.
pub struct ContextParts {
    pub stream: Arc<dyn MediaStream>,
    pub display: Arc<dyn DisplayHost>,
    pub renderer: Box<dyn OverlayRenderer>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub logger: Arc<Mutex<dyn SessionLogger>>,
}

/// All cross-tick state of a running session. Owned by the session worker;
/// every handler runs against it one at a time.
pub struct CaptureContext {
    surfaces: MediaSurfaces,
    processor: DetectionProcessor,
    status: StatusBoard,
    last_box: Option<BoundingBox>,
    fallback_native: Size,
    parts: ContextParts,
}

impl CaptureContext {
    pub fn new(surfaces: MediaSurfaces, fallback_native: Size, parts: ContextParts) -> Self {
        let mut status = StatusBoard::new();
        status.set_hidden(parts.display.is_hidden());
        Self {
            surfaces,
            processor: DetectionProcessor::new(),
            status,
            last_box: None,
            fallback_native,
            parts,
        }
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn mark_live(&mut self) {
        self.status.mark_live();
    }

    pub fn last_box(&self) -> Option<BoundingBox> {
        self.last_box
    }

    pub fn surfaces(&self) -> &MediaSurfaces {
        &self.surfaces
    }

    pub fn overlay_snapshot(&self) -> RgbaImage {
        self.surfaces.overlay().clone()
    }

    pub fn record_timing(&self, stage: &str, duration_ms: f64) {
        self.logger().timing(stage, duration_ms);
    }

    fn logger(&self) -> std::sync::MutexGuard<'_, dyn SessionLogger + 'static> {
        self.parts
            .logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle_display_event(&mut self, event: DisplayEvent) {
        let before = self.status.displayed();
        match event {
            DisplayEvent::ElementResized | DisplayEvent::WindowResized => self.refresh_overlay_size(),
            DisplayEvent::VisibilityChanged { hidden } => {
                log::debug!("Document {}", if hidden { "hidden" } else { "visible" });
                self.status.set_hidden(hidden);
            }
        }
        self.note_transition(before);
    }

    /// Re-reads the rendered box from the host and resizes the overlay.
    fn refresh_overlay_size(&mut self) {
        let Some(rendered) = self.parts.display.rendered_size() else {
            log::warn!("Display target disappeared; keeping overlay size");
            return;
        };
        if self.surfaces.resize_overlay(rendered) {
            log::debug!("Overlay resized to {}", self.surfaces.overlay_size());
        }
    }

    fn note_transition(&self, before: PipelineStatus) {
        let after = self.status.displayed();
        if after != before {
            log::debug!("Status {before:?} -> {after:?}");
            self.logger().status_changed(before, after);
        }
    }

    /// One still at native resolution, paired with the current face position.
    /// `None` unless the stream is live with a known resolution and a frame.
    pub fn capture_once(&mut self) -> Option<CaptureRecord> {
        if !self.parts.stream.is_active() {
            return None;
        }
        self.surfaces.native().filter(|s| !s.is_empty())?;
        let frame = self.parts.stream.latest_frame()?;

        let t0 = Instant::now();
        self.surfaces.set_native(frame.size());
        self.surfaces.capture_mut().copy_from(&frame);
        let image_b64 = match self.parts.encoder.encode(self.surfaces.capture()) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Failed to encode capture: {e}");
                return None;
            }
        };
        self.record_timing("encode", t0.elapsed().as_secs_f64() * 1000.0);

        Some(CaptureRecord {
            image_b64,
            position: self.current_position(),
        })
    }

    /// Position of the last box under a transform rebuilt from the rendered
    /// box as it is right now.
    fn current_position(&self) -> PositionData {
        let Some(bbox) = self.last_box else {
            return PositionData::centered_default();
        };
        let rendered = self
            .parts
            .display
            .rendered_size()
            .unwrap_or_else(|| self.surfaces.overlay_size());
        let transform = cover_transform(self.surfaces.native_or(self.fallback_native), rendered);
        PositionData::from_box(&bbox, &transform)
    }

    /// Releases the stream. Idempotent.
    pub fn stop_stream(&self) {
        self.parts.stream.stop();
    }
}

impl DetectionResultHandler for CaptureContext {
    fn on_result(&mut self, points: &[LandmarkPoint], topology: Option<&Topology>) {
        if let Some(native) = self.parts.stream.native_size().filter(|s| !s.is_empty()) {
            self.surfaces.set_native(native);
        }
        let before = self.status.displayed();
        let outcome = self.processor.process(
            points,
            self.surfaces.native_or(self.fallback_native),
            self.surfaces.overlay_size(),
        );
        self.last_box = outcome.bounding_box;
        self.status.record_detection(outcome.status);
        self.note_transition(before);

        let t0 = Instant::now();
        let rendered = self.parts.renderer.render(
            self.surfaces.overlay_mut(),
            points,
            topology,
            &outcome.transform,
        );
        match rendered {
            Ok(()) => self.record_timing("render", t0.elapsed().as_secs_f64() * 1000.0),
            Err(e) => log::warn!("Overlay render failed: {e}"),
        }
    }
}
