//! leafcam - live plant leaf disease detection
//!
//! Opens the camera, streams frames to the detection service and shows the
//! annotated result. With the `window` feature a desktop window is opened;
//! otherwise the client runs headless, starts detecting right away and logs
//! every result until Ctrl-C.

use anyhow::Context;
use leafcam::app::{command_channel, App};
use leafcam::{ClientConfig, DetectionController, HttpDetectionClient, SharedUi, UiCommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "webcam")]
fn camera(config: &ClientConfig) -> leafcam::camera::WebcamDevice {
    leafcam::camera::WebcamDevice::new(
        config.camera_index(leafcam::FacingMode::Environment),
        config.camera_index(leafcam::FacingMode::User),
    )
}

#[cfg(not(feature = "webcam"))]
fn camera(_config: &ClientConfig) -> leafcam::PatternCamera {
    info!("Built without the `webcam` feature, using the synthetic pattern camera");
    leafcam::PatternCamera::new()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env().context("invalid LEAFCAM_* configuration")?;
    info!("Starting leafcam against {}", config.server_url);

    let service = HttpDetectionClient::new(config.server_url.clone());
    let ui = SharedUi::new();
    let controller = DetectionController::create(camera(&config), service, config, ui.clone());
    let (commands, receiver) = command_channel();

    #[cfg(feature = "window")]
    let window = leafcam::ui::launch_window(ui.clone(), controller.surface(), commands.clone());

    #[cfg(not(feature = "window"))]
    {
        commands.send(UiCommand::Start)?;
        tokio::spawn(log_results(ui.clone()));
    }

    let shutdown = commands.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = shutdown.send(UiCommand::Quit);
        }
    });
    drop(commands);

    App::new(controller).run(receiver).await;

    #[cfg(feature = "window")]
    {
        if window.join().is_err() {
            anyhow::bail!("window thread panicked");
        }
    }

    Ok(())
}

/// Headless stand-in for the window: log each new result and status change.
#[cfg(not(feature = "window"))]
async fn log_results(ui: SharedUi) {
    use leafcam::presenter::DetectionRow;
    use std::time::Duration;

    let mut seen_revision = 0;
    let mut last_status = String::new();
    let mut last_alert: Option<String> = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        ticker.tick().await;
        let state = ui.lock();
        if state.status_text != last_status {
            last_status = state.status_text.clone();
            info!("Status: {} ({})", last_status, state.fps_text);
        }
        if state.alert != last_alert {
            last_alert = state.alert.clone();
            if let Some(alert) = &last_alert {
                tracing::warn!("{}", alert);
            }
        }
        if state.result_revision != seen_revision {
            seen_revision = state.result_revision;
            if let Some(view) = &state.result {
                let rows: Vec<String> = view
                    .detections
                    .iter()
                    .map(|row| match row {
                        DetectionRow::Detected { class_name, confidence, .. } => format!("{} {}", class_name, confidence),
                        DetectionRow::Nothing => row.label().to_string(),
                    })
                    .collect();
                info!("Result #{}: {} | {}", seen_revision, rows.join(", "), state.fps_text);
            }
        }
    }
}
