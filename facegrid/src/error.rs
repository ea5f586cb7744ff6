// THEORY:
// Every failure the engine can observe is an *unavailable capability*, never a
// reason to stop drawing. The error types below exist so that each collaborator
// boundary (camera, detector, assets, configuration) can report precisely what
// went wrong, while the engine and runtime convert every one of them into a
// documented fallback path and a log line.
//
// Key architectural principles:
// 1.  **Narrow Errors at the Seams**: Each collaborator gets its own enum so the
//     caller can match on what matters (e.g. a detector timeout counts toward the
//     disable threshold exactly like a hard failure).
// 2.  **One Umbrella Type**: `FaceGridError` wraps them for library entry points
//     that can fail for more than one reason.
// 3.  **No Panics on the Render Path**: nothing in this module is ever unwrapped
//     by the render loop; errors end their life as `tracing::warn!` events.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to acquire or read from a camera.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera access denied or device missing: {0}")]
    Unavailable(String),
    #[error("camera stream ended")]
    StreamEnded,
    #[error("camera backend error: {0}")]
    Backend(String),
}

/// Failure of a single face-detection request.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("face detection timed out after {0:?}")]
    Timeout(Duration),
    #[error("face detector is not available")]
    Unavailable,
    #[error("face detection failed: {0}")]
    Failed(String),
}

/// Failure to load a font or image asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read asset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("malformed article catalog: {0}")]
    Catalog(#[from] serde_json::Error),
}

/// Failure to load or interpret engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum FaceGridError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("engine runtime has shut down")]
    RuntimeClosed,
}

pub type Result<T, E = FaceGridError> = std::result::Result<T, E>;
