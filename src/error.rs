// Error types for the censoring pipeline and its collaborators
use std::path::PathBuf;
use thiserror::Error;

use crate::sync::GeometryField;

/// Result type for pipeline operations.
pub type CensorResult<T> = Result<T, CensorError>;

/// Errors raised inside a processing tick or at session startup.
///
/// Everything except `PlaybackInitFailure` is contained within a single tick
/// and never ends the playback session.
#[derive(Debug, Error)]
pub enum CensorError {
    #[error("geometry incomplete, missing {missing:?}")]
    IncompleteGeometry { missing: Vec<GeometryField> },

    #[error("detection failed: {0}")]
    DetectionFailure(#[from] DetectionError),

    #[error("frame capture failed: {0}")]
    FrameCaptureFailure(#[source] PlaybackError),

    #[error("overlay request failed: {0}")]
    OverlayCollaboratorFailure(#[source] PlaybackError),

    #[error("playback failed to start: {0}")]
    PlaybackInitFailure(#[source] PlaybackError),

    #[error("invalid geometry: video is {width}x{height}")]
    InvalidGeometry { width: f64, height: f64 },
}

impl CensorError {
    /// Whether the error came from the playback collaborator and counts
    /// toward degraded mode.
    pub fn is_playback_failure(&self) -> bool {
        matches!(
            self,
            Self::FrameCaptureFailure(_) | Self::OverlayCollaboratorFailure(_)
        )
    }
}

/// Errors reported by the playback engine.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("ffmpeg: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("no video stream found in {0}")]
    NoVideoStream(String),

    #[error("no frame decoded yet")]
    NoFrame,

    #[error("overlay rejected: {0}")]
    OverlayRejected(String),

    #[error("overlay table full ({0} slots)")]
    OverlayTableFull(usize),

    #[error("unknown overlay id {0}")]
    UnknownOverlay(u32),

    #[error("player thread has stopped")]
    Disconnected,
}

/// Errors reported by the detection backend.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("failed to run detector `{program}`: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("detector exited with {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    #[error("failed to write frame for detector: {0}")]
    FrameWrite(#[from] image::ImageError),

    #[error("malformed detector output: {0}")]
    MalformedOutput(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}
