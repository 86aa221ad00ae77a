/// Native size assumed while the stream has not reported its dimensions yet.
pub const FALLBACK_NATIVE_WIDTH: u32 = 640;
pub const FALLBACK_NATIVE_HEIGHT: u32 = 480;

/// Boxes narrower than this fraction (after the 1.5 proximity factor) are "too far".
pub const MIN_READY_SCALE: f64 = 0.25;

/// Multiplier applied to the box/content width ratio to estimate proximity.
pub const PROXIMITY_FACTOR: f64 = 1.5;

/// Position reported for captures taken while no face box is known.
pub const DEFAULT_POSITION: (f64, f64, f64) = (0.5, 0.5, 0.25);

pub const JPEG_QUALITY: u8 = 92;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 220;

pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_MIN_TRACKING_CONFIDENCE: f64 = 0.7;

/// Ideal capture resolution requested from the camera.
pub const IDEAL_CAMERA_WIDTH: u32 = 640;
pub const IDEAL_CAMERA_HEIGHT: u32 = 400;
pub const IDEAL_CAMERA_FPS: u32 = 30;

/// Detector cadence (~30 ticks per second).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 33;

pub const DEFAULT_METADATA_TIMEOUT_MS: u64 = 10_000;

pub const FACE_DETECTION_MODEL_NAME: &str = "face_detection_short_range.onnx";
pub const FACE_LANDMARK_MODEL_NAME: &str = "face_landmark.onnx";

/// Landmark count of the base mesh; refined models append iris points.
pub const MESH_LANDMARKS: usize = 468;
pub const REFINED_MESH_LANDMARKS: usize = 478;
