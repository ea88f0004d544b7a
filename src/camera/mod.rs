//! Camera session management
//!
//! A [`CameraSession`] owns at most one open [`VideoStream`] at a time. The
//! stream lives in a [`StreamSlot`] that the renderer reads from; only the
//! session ever replaces or clears it.

mod pattern;
#[cfg(feature = "webcam")]
mod webcam;

pub use pattern::{PatternCamera, PatternControl};
#[cfg(feature = "webcam")]
pub use webcam::{list_cameras, WebcamDevice, WebcamInfo};

use image::RgbImage;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Which physical camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacingMode {
    /// Rear camera, pointing away from the user
    Environment,
    /// Front camera, pointing at the user
    User,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Environment => Self::User,
            Self::User => Self::Environment,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::User => "user",
        }
    }
}

/// What a session asks the device for. Resolution is a hint only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

/// Reasons a camera stream could not be acquired
#[derive(Debug, Clone, thiserror::Error)]
pub enum CameraError {
    #[error("camera access is not supported on this system")]
    NotSupported,

    #[error("no camera found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera busy: {0}")]
    Busy(String),

    #[error("camera backend error: {0}")]
    Backend(String),
}

/// A live video stream handed out by a [`CameraDevice`].
pub trait VideoStream: Send {
    /// Native frame size, `(0, 0)` until the first frame metadata is known.
    fn dimensions(&self) -> (u32, u32);

    /// Most recent decoded frame, if any.
    fn latest_frame(&mut self) -> Option<RgbImage>;

    /// Release the underlying device. Must be idempotent.
    fn stop(&mut self);
}

/// A source of camera streams.
pub trait CameraDevice: Send + Sync + 'static {
    /// Whether this system exposes a camera API at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Human readable backend name, for logs
    fn name(&self) -> String;

    /// Request a new video-only stream.
    fn acquire(
        &self,
        constraints: StreamConstraints,
    ) -> impl Future<Output = Result<Box<dyn VideoStream>, CameraError>> + Send;
}

/// The currently open stream, tagged with a per-session unique id.
pub struct ActiveStream {
    id: u64,
    facing: FacingMode,
    stream: Box<dyn VideoStream>,
}

impl ActiveStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.stream.dimensions()
    }

    /// Whether the stream has reported non-zero frame dimensions yet.
    pub fn has_video(&self) -> bool {
        let (width, height) = self.dimensions();
        width > 0 && height > 0
    }

    pub fn latest_frame(&mut self) -> Option<RgbImage> {
        self.stream.latest_frame()
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.stream.stop();
    }
}

impl std::fmt::Debug for ActiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveStream")
            .field("id", &self.id)
            .field("facing", &self.facing)
            .field("dimensions", &self.dimensions())
            .finish()
    }
}

/// Shared holder for the active stream.
///
/// Locks are held only for short synchronous sections, never across `.await`.
#[derive(Clone, Default)]
pub struct StreamSlot {
    inner: Arc<Mutex<Option<ActiveStream>>>,
}

impl StreamSlot {
    /// Run `f` against the active stream, if there is one.
    pub fn with_stream<R>(&self, f: impl FnOnce(&mut ActiveStream) -> R) -> Option<R> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_mut().map(f)
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn put(&self, stream: ActiveStream) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream);
    }

    fn take(&self) -> Option<ActiveStream> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Owns the camera lifecycle: open, switch facing mode, close.
pub struct CameraSession<D> {
    device: D,
    slot: StreamSlot,
    facing: FacingMode,
    ideal_width: u32,
    ideal_height: u32,
    next_stream_id: u64,
}

impl<D: CameraDevice> CameraSession<D> {
    pub fn new(device: D, facing: FacingMode, ideal_width: u32, ideal_height: u32) -> Self {
        Self {
            device,
            slot: StreamSlot::default(),
            facing,
            ideal_width,
            ideal_height,
            next_stream_id: 1,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Handle to the slot the renderer draws from
    pub fn slot(&self) -> StreamSlot {
        self.slot.clone()
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.facing
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_open()
    }

    /// Open a stream for `facing`, replacing any stream already open.
    ///
    /// The previous stream is released before the new one is requested, so
    /// single-camera devices never see two handles at once.
    pub async fn open(&mut self, facing: FacingMode) -> Result<(), CameraError> {
        self.facing = facing;
        self.close();

        if !self.device.is_supported() {
            return Err(CameraError::NotSupported);
        }

        let constraints = StreamConstraints {
            facing,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        };
        debug!("Requesting {} camera from {}", facing.as_str(), self.device.name());
        let stream = self.device.acquire(constraints).await?;

        let id = self.next_stream_id;
        self.next_stream_id += 1;
        self.slot.put(ActiveStream { id, facing, stream });
        info!("Camera stream #{} open ({} facing)", id, facing.as_str());
        Ok(())
    }

    /// Toggle the facing mode and reopen.
    pub async fn switch(&mut self) -> Result<(), CameraError> {
        let next = self.facing.toggled();
        info!("Switching camera to {} facing", next.as_str());
        self.open(next).await
    }

    /// Release the active stream. Safe to call when nothing is open.
    pub fn close(&mut self) {
        if let Some(stream) = self.slot.take() {
            debug!("Releasing camera stream #{}", stream.id);
            drop(stream);
        }
    }
}
