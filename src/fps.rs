//! Frames-per-second accounting for completed detection cycles

use std::time::{Duration, Instant};

/// Counts successful cycles and publishes a rate once per window.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    frame_count: u32,
    window_start: Instant,
    window: Duration,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            frame_count: 0,
            window_start: Instant::now(),
            window,
        }
    }

    /// Restart the window at `now` with an empty count.
    pub fn reset(&mut self, now: Instant) {
        self.frame_count = 0;
        self.window_start = now;
    }

    /// Record one completed cycle. Returns the rate when the window closes.
    pub fn record(&mut self, now: Instant) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }

        let fps = self.frame_count as f64 / elapsed.as_secs_f64();
        self.reset(now);
        Some(fps)
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }
}

/// Text shown in the FPS indicator
pub fn format_fps(fps: f64) -> String {
    format!("{:.1} FPS", fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publishes_once_window_elapses() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(Duration::from_secs(1));
        fps.reset(start);

        assert_eq!(fps.record(start + Duration::from_millis(300)), None);
        assert_eq!(fps.record(start + Duration::from_millis(600)), None);
        assert_eq!(fps.record(start + Duration::from_millis(900)), None);
        assert_eq!(fps.frame_count(), 3);

        let rate = fps.record(start + Duration::from_millis(1250)).unwrap();
        assert!((rate - 4.0 / 1.25).abs() < 1e-9);
        assert_eq!(fps.frame_count(), 0);
    }

    #[test]
    fn test_window_restarts_after_publish() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(Duration::from_secs(1));
        fps.reset(start);

        let first = start + Duration::from_secs(2);
        assert_eq!(fps.record(first), Some(0.5));

        assert_eq!(fps.record(first + Duration::from_millis(500)), None);
        assert_eq!(fps.record(first + Duration::from_secs(1)), Some(2.0));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_fps(1.96), "2.0 FPS");
        assert_eq!(format_fps(0.0), "0.0 FPS");
    }
}
