//! View model shared between the controller and the window
//!
//! The controller writes [`UiState`]; the window only reads it and reports
//! button presses back as [`UiCommand`]s.

#[cfg(feature = "window")]
mod window;

#[cfg(feature = "window")]
pub use window::{launch_window, WindowApp};

use crate::camera::FacingMode;
use crate::presenter::ResultView;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// User actions emitted by the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    Start,
    Stop,
    Capture,
    SwitchCamera,
    DismissAlert,
    Quit,
}

/// Transient confirmation banner
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub message: String,
    /// Identifies which `show_toast` call produced this toast
    pub generation: u64,
}

pub struct UiState {
    /// Status line under the preview
    pub status_text: String,
    /// Detection rate indicator
    pub fps_text: String,
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub capture_enabled: bool,
    pub switch_enabled: bool,
    /// Latest rendered detection result. `None` shows the empty placeholder.
    pub result: Option<ResultView>,
    /// Bumped whenever `result` is replaced
    pub result_revision: u64,
    pub toast: Option<Toast>,
    toast_generation: u64,
    /// Blocking message the user has to dismiss
    pub alert: Option<String>,
    /// Loading overlay shown while a capture is being saved
    pub loading: bool,
    pub facing: FacingMode,
    /// Classes the service model knows, filled on load
    pub model_classes: Vec<String>,
    /// One-line summary of the last service health probe
    pub service_status: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}

impl UiState {
    pub fn new() -> Self {
        Self {
            status_text: "Initializing camera...".to_string(),
            fps_text: "0 FPS".to_string(),
            start_enabled: false,
            stop_enabled: false,
            capture_enabled: false,
            switch_enabled: true,
            result: None,
            result_revision: 0,
            toast: None,
            toast_generation: 0,
            alert: None,
            loading: false,
            facing: FacingMode::Environment,
            model_classes: Vec::new(),
            service_status: None,
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
    }

    /// Replace the rendered result with `view`.
    pub fn show_result(&mut self, view: ResultView) {
        self.result = Some(view);
        self.result_revision += 1;
    }

    /// Show a toast and return its generation, used to dismiss it later.
    pub fn show_toast(&mut self, message: impl Into<String>) -> u64 {
        self.toast_generation += 1;
        self.toast = Some(Toast {
            message: message.into(),
            generation: self.toast_generation,
        });
        self.toast_generation
    }

    /// Hide the toast, unless a newer one replaced it in the meantime.
    pub fn dismiss_toast(&mut self, generation: u64) -> bool {
        match &self.toast {
            Some(toast) if toast.generation == generation => {
                self.toast = None;
                true
            }
            _ => false,
        }
    }

    pub fn show_alert(&mut self, message: impl Into<String>) {
        self.alert = Some(message.into());
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }
}

/// Handle to the view model shared by the controller and the window
#[derive(Clone, Default)]
pub struct SharedUi {
    inner: Arc<Mutex<UiState>>,
}

impl SharedUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, UiState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut UiState) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn status_text(&self) -> String {
        self.lock().status_text.clone()
    }
}
