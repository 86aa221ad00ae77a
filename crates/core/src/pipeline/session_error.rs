use thiserror::Error;

use crate::shared::asset_resolver::AssetError;
use crate::shared::error::SendError;

/// Why a session failed to come up. Each variant is terminal for the run.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load detector assets: {0}")]
    AssetLoad(#[from] AssetError),
    #[error("camera unavailable: {0}")]
    CameraUnavailable(#[source] SendError),
    #[error("no display target to render into")]
    MissingTarget,
    #[error("camera did not report its resolution within {0} ms")]
    MetadataTimeout(u64),
    #[error("failed to initialize detector: {0}")]
    Detector(#[source] SendError),
    #[error("failed to start {0} thread: {1}")]
    Thread(&'static str, #[source] std::io::Error),
    /// `stop()` ran while acquisition was in flight. Never surfaced.
    #[error("session was stopped")]
    Cancelled,
}
