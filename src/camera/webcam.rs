//! Hardware camera backend built on `nokhwa`.
//!
//! The nokhwa handle is not shareable across threads, so each stream owns a
//! dedicated capture thread that keeps decoding frames into a shared slot
//! until the stream is stopped.

use super::{CameraDevice, CameraError, FacingMode, StreamConstraints, VideoStream};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::{Camera, NokhwaError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Camera reported by the platform backend
#[derive(Debug, Clone)]
pub struct WebcamInfo {
    pub index: String,
    pub name: String,
    pub description: String,
}

/// List the cameras the platform backend can see.
pub fn list_cameras() -> Result<Vec<WebcamInfo>, CameraError> {
    let cameras = nokhwa::query(ApiBackend::Auto).map_err(classify)?;
    Ok(cameras
        .into_iter()
        .map(|info| WebcamInfo {
            index: info.index().to_string(),
            name: info.human_name(),
            description: info.description().to_string(),
        })
        .collect())
}

/// Physical cameras, one device index per facing mode
#[derive(Debug, Clone)]
pub struct WebcamDevice {
    environment_index: u32,
    user_index: u32,
}

impl WebcamDevice {
    pub fn new(environment_index: u32, user_index: u32) -> Self {
        Self {
            environment_index,
            user_index,
        }
    }

    fn index_for(&self, facing: FacingMode) -> u32 {
        match facing {
            FacingMode::Environment => self.environment_index,
            FacingMode::User => self.user_index,
        }
    }
}

impl CameraDevice for WebcamDevice {
    fn is_supported(&self) -> bool {
        nokhwa::query(ApiBackend::Auto).is_ok()
    }

    fn name(&self) -> String {
        format!("webcam (env #{}, user #{})", self.environment_index, self.user_index)
    }

    async fn acquire(&self, constraints: StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        let index = self.index_for(constraints.facing);
        let shared = Arc::new(CaptureShared::default());
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name(format!("webcam-{}", index))
            .spawn(move || capture_thread(index, constraints, thread_shared, ready_tx))
            .map_err(|e| CameraError::Backend(e.to_string()))?;

        let opened = ready_rx
            .await
            .unwrap_or_else(|_| Err(CameraError::Backend("capture thread exited".to_string())));

        match opened {
            Ok(()) => Ok(Box::new(WebcamStream {
                shared,
                handle: Some(handle),
            })),
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }
}

#[derive(Default)]
struct CaptureShared {
    latest: Mutex<Option<RgbImage>>,
    width: AtomicU32,
    height: AtomicU32,
    stop: AtomicBool,
}

fn capture_thread(
    index: u32,
    constraints: StreamConstraints,
    shared: Arc<CaptureShared>,
    ready_tx: oneshot::Sender<Result<(), CameraError>>,
) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
        Resolution::new(constraints.ideal_width, constraints.ideal_height),
        FrameFormat::MJPEG,
        30,
    )));

    let mut camera = match Camera::new(CameraIndex::Index(index), format) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready_tx.send(Err(classify(e)));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready_tx.send(Err(classify(e)));
        return;
    }

    let resolution = camera.resolution();
    info!(
        "Using camera #{}: {} ({}x{} requested {}x{})",
        index,
        camera.info().human_name(),
        resolution.width(),
        resolution.height(),
        constraints.ideal_width,
        constraints.ideal_height
    );
    let _ = ready_tx.send(Ok(()));

    while !shared.stop.load(Ordering::SeqCst) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>());

        match decoded {
            Ok(decoded) => {
                let (width, height) = (decoded.width(), decoded.height());
                let Some(frame) = RgbImage::from_raw(width, height, decoded.into_raw()) else {
                    debug!("Dropping malformed {}x{} frame", width, height);
                    continue;
                };
                shared.width.store(width, Ordering::SeqCst);
                shared.height.store(height, Ordering::SeqCst);
                *shared.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            }
            Err(e) => {
                warn!("Camera #{} frame error: {}", index, e);
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Failed to stop camera #{}: {}", index, e);
    }
    debug!("Capture thread for camera #{} finished", index);
}

struct WebcamStream {
    shared: Arc<CaptureShared>,
    handle: Option<JoinHandle<()>>,
}

impl VideoStream for WebcamStream {
    fn dimensions(&self) -> (u32, u32) {
        (
            self.shared.width.load(Ordering::SeqCst),
            self.shared.height.load(Ordering::SeqCst),
        )
    }

    fn latest_frame(&mut self) -> Option<RgbImage> {
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // Joining guarantees the device handle is released before a new one is requested
            let _ = handle.join();
        }
    }
}

impl Drop for WebcamStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn classify(error: NokhwaError) -> CameraError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CameraError::PermissionDenied(message)
    } else if lower.contains("busy") || lower.contains("in use") {
        CameraError::Busy(message)
    } else if lower.contains("not found") || lower.contains("no device") || lower.contains("invalid index") {
        CameraError::NotFound(message)
    } else {
        CameraError::Backend(message)
    }
}
