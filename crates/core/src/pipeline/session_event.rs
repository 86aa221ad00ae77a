use crossbeam_channel::Sender;
use image::RgbaImage;

use crate::capture::domain::capture_record::CaptureRecord;
use crate::detection::domain::landmark_detector::DetectionResult;
use crate::display::domain::display_host::DisplayEvent;

/// Everything the session worker reacts to, in arrival order.
pub enum SessionEvent {
    Detection {
        result: DetectionResult,
        detect_ms: f64,
    },
    Display(DisplayEvent),
    Capture(Sender<Option<CaptureRecord>>),
    SnapshotOverlay(Sender<RgbaImage>),
    Shutdown,
}
