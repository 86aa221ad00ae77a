use crate::shared::error::SendError;
use crate::shared::frame::Frame;

/// Encodes a still into the string form attached to a capture record.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &Frame) -> Result<String, SendError>;
}
