use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::shared::constants::{IDEAL_CAMERA_FPS, IDEAL_CAMERA_HEIGHT, IDEAL_CAMERA_WIDTH};
use crate::shared::error::SendError;
use crate::shared::frame::Frame;
use crate::shared::size::Size;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// What the session asks the camera for. Every field is a preference; the
/// stream reports what it actually negotiated through
/// [`MediaStream::native_size`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::User,
            ideal_width: IDEAL_CAMERA_WIDTH,
            ideal_height: IDEAL_CAMERA_HEIGHT,
            frame_rate: IDEAL_CAMERA_FPS,
        }
    }
}

/// Camera collaborator. Opening may block (permission prompt, device warm-up).
pub trait Camera: Send + Sync {
    fn open(&self, constraints: &StreamConstraints) -> Result<Arc<dyn MediaStream>, SendError>;
}

/// A live stream. Shared between the session worker and the frame feeder.
pub trait MediaStream: Send + Sync {
    /// Negotiated resolution, `None` until the first frame metadata arrives.
    fn native_size(&self) -> Option<Size>;

    /// Most recent decoded frame, if any.
    fn latest_frame(&self) -> Option<Frame>;

    /// Stops every track. Idempotent.
    fn stop(&self);

    fn is_active(&self) -> bool;
}
