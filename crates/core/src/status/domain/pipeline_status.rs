use serde::{Deserialize, Serialize};

/// Detection-quality state of the capture pipeline.
///
/// `Paused` is never produced by detection; it is only what [`StatusBoard`]
/// displays while the document is hidden.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Initializing,
    NoFace,
    TooFar,
    Ready,
    Paused,
}

pub const LABEL_STARTING: &str = "Inicializando cámara...";
pub const LABEL_SEARCHING: &str = "Buscando rostro...";
pub const LABEL_NO_FACE: &str = "No se detecta rostro";
pub const LABEL_TOO_FAR: &str = "Muy lejos";
pub const LABEL_READY: &str = "Rostro listo";
pub const LABEL_PAUSED: &str = "Pausado";

/// Holds the detection-driven status plus the display-only overlays
/// (camera not live yet, document hidden).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusBoard {
    detected: PipelineStatus,
    live: bool,
    hidden: bool,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            detected: PipelineStatus::Initializing,
            live: false,
            hidden: false,
        }
    }

    /// Records the outcome of a detection tick. `Paused` and `Initializing`
    /// are not detection outcomes and are ignored.
    pub fn record_detection(&mut self, status: PipelineStatus) {
        match status {
            PipelineStatus::NoFace | PipelineStatus::TooFar | PipelineStatus::Ready => {
                self.detected = status;
            }
            PipelineStatus::Initializing | PipelineStatus::Paused => {
                log::debug!("Ignoring non-detection status {status:?}");
            }
        }
    }

    /// The camera stream is up and the detector is being fed.
    pub fn mark_live(&mut self) {
        self.live = true;
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// Status as displayed: `Paused` while hidden, otherwise the last
    /// detection outcome.
    pub fn displayed(&self) -> PipelineStatus {
        if self.hidden {
            PipelineStatus::Paused
        } else {
            self.detected
        }
    }

    /// Last detection outcome, unaffected by visibility.
    pub fn detected(&self) -> PipelineStatus {
        self.detected
    }

    pub fn face_ready(&self) -> bool {
        self.detected == PipelineStatus::Ready
    }

    pub fn label(&self) -> &'static str {
        match self.displayed() {
            PipelineStatus::Initializing if self.live => LABEL_SEARCHING,
            PipelineStatus::Initializing => LABEL_STARTING,
            PipelineStatus::NoFace => LABEL_NO_FACE,
            PipelineStatus::TooFar => LABEL_TOO_FAR,
            PipelineStatus::Ready => LABEL_READY,
            PipelineStatus::Paused => LABEL_PAUSED,
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
