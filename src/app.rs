//! Lifecycle and command routing
//!
//! Load: open the camera, start the preview, probe the service. Then route
//! window commands to the controller until `Quit` (or the channel closes),
//! and finally unload: stop, drop the preview, release the camera.

use crate::camera::CameraDevice;
use crate::client::DetectionService;
use crate::controller::DetectionController;
use crate::ui::{SharedUi, UiCommand};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Channel the window sends its button presses through
pub fn command_channel() -> (UnboundedSender<UiCommand>, UnboundedReceiver<UiCommand>) {
    mpsc::unbounded_channel()
}

/// Ask the service whether it is up and which classes its model knows.
///
/// Failures are logged and otherwise ignored.
pub async fn probe_service<S: DetectionService>(service: &S, ui: &SharedUi) {
    match service.health().await {
        Ok(health) => {
            info!(
                "Detection service is {} (model loaded: {})",
                health.status, health.model_loaded
            );
            let summary = if health.is_healthy() && health.model_loaded {
                "Service online".to_string()
            } else {
                format!("Service {} (model loaded: {})", health.status, health.model_loaded)
            };
            ui.update(|s| s.service_status = Some(summary));
        }
        Err(e) => {
            warn!("Health check failed: {}", e);
            ui.update(|s| s.service_status = Some(format!("Service unreachable: {}", e)));
        }
    }

    match service.model_info().await {
        Ok(info) if info.loaded => {
            let classes = info.class_names();
            info!("Model knows {} classes", classes.len());
            ui.update(|s| s.model_classes = classes);
        }
        Ok(info) => {
            warn!(
                "Model not loaded: {}",
                info.message.as_deref().unwrap_or("no reason given")
            );
        }
        Err(e) => warn!("Model info request failed: {}", e),
    }
}

/// Routes [`UiCommand`]s to a [`DetectionController`].
pub struct App<D, S> {
    controller: DetectionController<D, S>,
}

impl<D: CameraDevice, S: DetectionService> App<D, S> {
    pub fn new(controller: DetectionController<D, S>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &DetectionController<D, S> {
        &self.controller
    }

    /// Load hook. Camera failures are already surfaced in the UI, so they do
    /// not abort the application.
    pub async fn load(&self) {
        info!("Initializing leaf disease detection client");
        if let Err(e) = self.controller.load().await {
            warn!("Camera not available on load: {}", e);
        }
        probe_service(self.controller.service(), self.controller.ui()).await;
    }

    /// Handle one command. Returns false once the app should quit.
    pub async fn handle(&self, command: UiCommand) -> bool {
        debug!("UI command: {:?}", command);
        match command {
            UiCommand::Start => {
                if let Err(e) = self.controller.start().await {
                    warn!("Could not start detection: {}", e);
                }
            }
            UiCommand::Stop => self.controller.stop(),
            UiCommand::Capture => {
                // Independent of the detection loop
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    if let Err(e) = controller.capture().await {
                        warn!("Capture failed: {}", e);
                    }
                });
            }
            UiCommand::SwitchCamera => {
                if let Err(e) = self.controller.switch_camera().await {
                    warn!("Camera switch failed: {}", e);
                }
            }
            UiCommand::DismissAlert => self.controller.ui().update(|s| s.dismiss_alert()),
            UiCommand::Quit => return false,
        }
        true
    }

    /// Unload hook
    pub async fn unload(&self) {
        self.controller.dispose().await;
        info!("Client shut down");
    }

    /// Load, serve commands until `Quit` or until every sender is gone, unload.
    pub async fn run(self, mut commands: UnboundedReceiver<UiCommand>) {
        self.load().await;
        while let Some(command) = commands.recv().await {
            if !self.handle(command).await {
                break;
            }
        }
        self.unload().await;
    }
}
