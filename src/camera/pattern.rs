//! Synthetic camera producing a moving test pattern.
//!
//! Used when no hardware backend is compiled in, and by the test suite. A
//! [`PatternControl`] handle lets callers deny access, hold back frames (the
//! "camera still warming up" case) and count live streams.

use super::{CameraDevice, CameraError, FacingMode, StreamConstraints, VideoStream};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct PatternShared {
    supported: bool,
    denied: AtomicBool,
    frames_ready: AtomicBool,
    live: AtomicUsize,
    opened: AtomicUsize,
    max_live: AtomicUsize,
}

/// Handle for steering a [`PatternCamera`] from the outside
#[derive(Debug, Clone)]
pub struct PatternControl {
    shared: Arc<PatternShared>,
}

impl PatternControl {
    /// Make every following acquisition fail with `PermissionDenied`.
    pub fn set_denied(&self, denied: bool) {
        self.shared.denied.store(denied, Ordering::SeqCst);
    }

    /// While false, streams report `(0, 0)` and yield no frames.
    pub fn set_frames_ready(&self, ready: bool) {
        self.shared.frames_ready.store(ready, Ordering::SeqCst);
    }

    /// Streams opened and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Total streams ever opened
    pub fn streams_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Highest number of streams that were live at the same time
    pub fn max_concurrent_streams(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }
}

/// Camera device generating a gradient that drifts a few pixels per frame
#[derive(Debug, Clone)]
pub struct PatternCamera {
    shared: Arc<PatternShared>,
}

impl Default for PatternCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternCamera {
    pub fn new() -> Self {
        Self::with_support(true)
    }

    /// A device that reports no camera API at all
    pub fn unsupported() -> Self {
        Self::with_support(false)
    }

    fn with_support(supported: bool) -> Self {
        Self {
            shared: Arc::new(PatternShared {
                supported,
                denied: AtomicBool::new(false),
                frames_ready: AtomicBool::new(true),
                live: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                max_live: AtomicUsize::new(0),
            }),
        }
    }

    pub fn control(&self) -> PatternControl {
        PatternControl {
            shared: self.shared.clone(),
        }
    }
}

impl CameraDevice for PatternCamera {
    fn is_supported(&self) -> bool {
        self.shared.supported
    }

    fn name(&self) -> String {
        "pattern".to_string()
    }

    async fn acquire(&self, constraints: StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        tokio::task::yield_now().await;

        if self.shared.denied.load(Ordering::SeqCst) {
            return Err(CameraError::PermissionDenied(
                "access to the pattern camera was refused".to_string(),
            ));
        }

        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);
        self.shared.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(PatternStream {
            shared: self.shared.clone(),
            width: constraints.ideal_width.max(1),
            height: constraints.ideal_height.max(1),
            facing: constraints.facing,
            tick: 0,
            stopped: false,
        }))
    }
}

struct PatternStream {
    shared: Arc<PatternShared>,
    width: u32,
    height: u32,
    facing: FacingMode,
    tick: u32,
    stopped: bool,
}

impl PatternStream {
    fn producing(&self) -> bool {
        !self.stopped && self.shared.frames_ready.load(Ordering::SeqCst)
    }
}

impl VideoStream for PatternStream {
    fn dimensions(&self) -> (u32, u32) {
        if self.producing() {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn latest_frame(&mut self) -> Option<RgbImage> {
        if !self.producing() {
            return None;
        }

        self.tick = self.tick.wrapping_add(1);
        let shift = self.tick.wrapping_mul(3);
        // Rear camera renders green, front camera renders blue
        let (green, blue) = match self.facing {
            FacingMode::Environment => (200u8, 60u8),
            FacingMode::User => (60u8, 200u8),
        };
        let (w, h) = (self.width, self.height);

        Some(RgbImage::from_fn(w, h, |x, y| {
            let column = (x + shift % w) % w;
            let red = ((column * 255) / w) as u8;
            let shade = ((y * 255) / h) as u8;
            Rgb([red, green.saturating_sub(shade / 4), blue.saturating_sub(shade / 4)])
        }))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.shared.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for PatternStream {
    fn drop(&mut self) {
        self.stop();
    }
}
