//! leafcam - live plant leaf disease detection client
//!
//! Samples frames from a camera, submits them to a remote detection service
//! and renders the returned overlay, feedback and quality metrics in near
//! real time. A capture action persists the most recent frame server-side.

#![deny(unsafe_code)]

pub mod app;
pub mod camera;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod fps;
pub mod frame;
pub mod presenter;
pub mod renderer;
pub mod ui;

pub use camera::{CameraDevice, CameraSession, FacingMode, PatternCamera};
pub use client::{DetectionService, HttpDetectionClient};
pub use config::ClientConfig;
pub use controller::{DetectionController, LoopState};
pub use error::{Error, Result};
pub use ui::{SharedUi, UiCommand, UiState};
