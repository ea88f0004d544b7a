//! Client configuration
//!
//! Defaults reproduce the reference timings (500ms between cycles, 200ms retry
//! while the camera warms up, ~30 Hz preview). Any of them can be overridden
//! through `LEAFCAM_*` environment variables.

use crate::camera::FacingMode;
use std::time::Duration;

/// Errors raised while reading configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be an unsigned integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("LEAFCAM_SERVER_URL must start with http:// or https://, got {0:?}")]
    InvalidUrl(String),
}

/// Configuration for the detection client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the detection / capture service
    pub server_url: String,
    /// JPEG quality used for every submitted frame (1-100)
    pub jpeg_quality: u8,
    /// Delay between two detection cycles, whatever their outcome
    pub cycle_interval: Duration,
    /// Delay before retrying when the camera has no usable frame yet
    pub not_ready_retry: Duration,
    /// Preview redraw cadence
    pub preview_interval: Duration,
    /// Width of the FPS measurement window
    pub fps_window: Duration,
    /// How long the capture confirmation stays visible
    pub toast_duration: Duration,
    /// Ideal stream resolution requested from the camera
    pub preferred_width: u32,
    pub preferred_height: u32,
    /// Facing mode opened on load
    pub initial_facing: FacingMode,
    /// Device index used for each facing mode by hardware backends
    pub environment_camera: u32,
    pub user_camera: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            jpeg_quality: 70,
            cycle_interval: Duration::from_millis(500),
            not_ready_retry: Duration::from_millis(200),
            preview_interval: Duration::from_millis(33),
            fps_window: Duration::from_secs(1),
            toast_duration: Duration::from_secs(3),
            preferred_width: 720,
            preferred_height: 1280,
            initial_facing: FacingMode::Environment,
            environment_camera: 0,
            user_camera: 1,
        }
    }
}

impl ClientConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("LEAFCAM_SERVER_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url));
            }
            config.server_url = url;
        }

        if let Some(quality) = read_number(&lookup, "LEAFCAM_JPEG_QUALITY", 1, 100)? {
            config.jpeg_quality = quality as u8;
        }
        if let Some(ms) = read_number(&lookup, "LEAFCAM_CYCLE_MS", 0, 60_000)? {
            config.cycle_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = read_number(&lookup, "LEAFCAM_NOT_READY_MS", 0, 60_000)? {
            config.not_ready_retry = Duration::from_millis(ms);
        }
        if let Some(ms) = read_number(&lookup, "LEAFCAM_PREVIEW_MS", 1, 1_000)? {
            config.preview_interval = Duration::from_millis(ms);
        }
        if let Some(index) = read_number(&lookup, "LEAFCAM_ENV_CAMERA", 0, u32::MAX as u64)? {
            config.environment_camera = index as u32;
        }
        if let Some(index) = read_number(&lookup, "LEAFCAM_USER_CAMERA", 0, u32::MAX as u64)? {
            config.user_camera = index as u32;
        }

        Ok(config)
    }

    /// Device index a hardware backend should open for `facing`.
    pub fn camera_index(&self, facing: FacingMode) -> u32 {
        match facing {
            FacingMode::Environment => self.environment_camera,
            FacingMode::User => self.user_camera,
        }
    }
}

fn read_number<F>(lookup: &F, name: &'static str, min: u64, max: u64) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.clone(),
    })?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { name, value, min, max });
    }
    Ok(Some(value))
}
