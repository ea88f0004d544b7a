//! Client-level error taxonomy
//!
//! Every failure path surfaces as one of these kinds; none of them is fatal to
//! the process. Only the detection cycle retries on its own.

use crate::camera::CameraError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Permission denied, no device, device busy or backend failure
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(#[from] CameraError),

    /// Network failure or non-2xx answer from `/detect`
    #[error("{0}")]
    DetectionRequestFailed(String),

    /// Network failure or non-2xx answer from `/capture`
    #[error("{0}")]
    CaptureRequestFailed(String),

    /// Capture requested before any frame was ever captured
    #[error("No frame available to capture")]
    NoFrameAvailable,

    /// JPEG encoding of a snapshot failed
    #[error("Encoding error: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
