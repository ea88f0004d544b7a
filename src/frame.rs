//! Encoded still frames and the single "last frame" slot

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// An encoded JPEG still taken from the video stream.
///
/// Cloning is cheap: the encoded bytes are shared.
#[derive(Debug, Clone)]
pub struct FrameSample {
    jpeg: Arc<[u8]>,
    width: u32,
    height: u32,
    captured_at: Instant,
}

impl FrameSample {
    pub fn new(jpeg: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            jpeg: jpeg.into(),
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Returns the MIME type of the encoded payload
    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Holds at most one frame; every store overwrites the previous one.
///
/// Written by the capture step of the detection cycle, read by the detection
/// dispatch and by the capture action.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<FrameSample>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: FrameSample) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    pub fn latest(&self) -> Option<FrameSample> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn has_frame(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}
