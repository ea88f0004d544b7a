//! Drawing surface and snapshot encoding
//!
//! The surface has two users: the preview task that redraws it at a fixed
//! cadence, and the detection cycle that snapshots it on demand. Both silently
//! do nothing while the stream has no usable dimensions.

use crate::camera::{ActiveStream, StreamSlot};
use crate::frame::FrameSample;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Errors raised while encoding a snapshot
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("JPEG encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Encoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Off-screen canvas the video feed is drawn onto.
#[derive(Debug)]
pub struct DrawingSurface {
    canvas: RgbImage,
    sized_for_stream: Option<u64>,
    resize_count: u64,
    revision: u64,
}

impl Default for DrawingSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingSurface {
    pub fn new() -> Self {
        Self {
            canvas: RgbImage::new(0, 0),
            sized_for_stream: None,
            resize_count: 0,
            revision: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn canvas(&self) -> &RgbImage {
        &self.canvas
    }

    /// Number of times the canvas was resized to a new stream
    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    /// Bumped on every successful draw
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Match the canvas to the stream's native size, once per stream.
    ///
    /// Returns false while the stream has no dimensions yet.
    fn sync_to_stream(&mut self, stream: &ActiveStream) -> bool {
        if !stream.has_video() {
            return false;
        }
        if self.sized_for_stream != Some(stream.id()) {
            let (width, height) = stream.dimensions();
            info!("Sizing drawing surface to {}x{} for stream #{}", width, height, stream.id());
            self.canvas = RgbImage::new(width, height);
            self.sized_for_stream = Some(stream.id());
            self.resize_count += 1;
        }
        true
    }

    /// Draw the stream's current frame. Returns whether anything was drawn.
    pub fn redraw(&mut self, stream: &mut ActiveStream) -> bool {
        if !self.sync_to_stream(stream) {
            return false;
        }
        let Some(frame) = stream.latest_frame() else {
            return false;
        };

        if frame.dimensions() == self.canvas.dimensions() {
            self.canvas = frame;
        } else {
            self.canvas = imageops::resize(&frame, self.canvas.width(), self.canvas.height(), FilterType::Triangle);
        }
        self.revision += 1;
        true
    }

    /// Draw the current frame and return a copy of the result.
    pub fn snapshot(&mut self, stream: &mut ActiveStream) -> Option<RgbImage> {
        if self.redraw(stream) {
            Some(self.canvas.clone())
        } else {
            None
        }
    }
}

/// Surface shared between the preview task, the detection cycle and the window
#[derive(Debug, Clone, Default)]
pub struct SharedSurface {
    inner: Arc<Mutex<DrawingSurface>>,
}

impl SharedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, DrawingSurface> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Redraw from whatever stream is open. Never blocks on anything but the locks.
    pub fn redraw_from(&self, slot: &StreamSlot) -> bool {
        slot.with_stream(|stream| self.lock().redraw(stream)).unwrap_or(false)
    }

    /// Snapshot the open stream, `None` if the camera has no frame yet.
    pub fn snapshot_from(&self, slot: &StreamSlot) -> Option<RgbImage> {
        slot.with_stream(|stream| self.lock().snapshot(stream)).flatten()
    }
}

/// Encode a snapshot as JPEG on the blocking pool.
pub async fn encode_jpeg(image: RgbImage, quality: u8) -> Result<FrameSample, EncodeError> {
    let (width, height) = image.dimensions();
    let jpeg = tokio::task::spawn_blocking(move || encode_jpeg_blocking(&image, quality)).await??;
    debug!("Encoded {}x{} frame: {} KB", width, height, jpeg.len() / 1024);
    Ok(FrameSample::new(jpeg, width, height))
}

/// Synchronous JPEG encoding, quality in 1..=100
pub fn encode_jpeg_blocking(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut jpeg_buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_buffer, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(jpeg_buffer)
}

/// Spawn the fixed-cadence preview redraw.
pub fn spawn_preview(slot: StreamSlot, surface: SharedSurface, every: Duration) -> JoinHandle<()> {
    info!("Starting preview redraw every {}ms", every.as_millis());
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            surface.redraw_from(&slot);
        }
    })
}
