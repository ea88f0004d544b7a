use leafcam::camera::{CameraSession, FacingMode};
use leafcam::client::DetectionService;
use leafcam::presenter::{present, DetectionRow};
use leafcam::renderer::{encode_jpeg, SharedSurface};
use leafcam::{CameraDevice, ClientConfig, HttpDetectionClient};
use std::time::Duration;

#[cfg(feature = "webcam")]
fn list_devices() {
    println!("Available cameras:");
    match leafcam::camera::list_cameras() {
        Ok(cameras) if cameras.is_empty() => println!("No cameras found!"),
        Ok(cameras) => {
            for camera in cameras {
                println!("{}: {}", camera.index, camera.name);
                println!("   {}", camera.description);
            }
        }
        Err(e) => println!("Error listing cameras: {}", e),
    }
}

#[cfg(not(feature = "webcam"))]
fn list_devices() {
    println!("Built without the `webcam` feature: only the pattern camera is available");
}

#[cfg(feature = "webcam")]
fn device(config: &ClientConfig) -> leafcam::camera::WebcamDevice {
    leafcam::camera::WebcamDevice::new(
        config.camera_index(leafcam::FacingMode::Environment),
        config.camera_index(leafcam::FacingMode::User),
    )
}

#[cfg(not(feature = "webcam"))]
fn device(_config: &ClientConfig) -> leafcam::PatternCamera {
    leafcam::PatternCamera::new()
}

async fn probe<D: CameraDevice>(
    session: &mut CameraSession<D>,
    facing: FacingMode,
    quality: u8,
) -> anyhow::Result<Option<leafcam::frame::FrameSample>> {
    println!("\nOpening {} camera...", facing.as_str());
    session.open(facing).await?;

    let surface = SharedSurface::new();
    let slot = session.slot();
    // Hardware cameras need a moment before the first frame arrives
    for _ in 0..50 {
        if let Some(snapshot) = surface.snapshot_from(&slot) {
            let frame = encode_jpeg(snapshot, quality).await?;
            println!(
                "  ✅ {}x{} frame, {} KB as JPEG (quality {})",
                frame.width(),
                frame.height(),
                frame.len() / 1024,
                quality
            );
            return Ok(Some(frame));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!("  ❌ No frame within 5 seconds");
    Ok(None)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ClientConfig::from_env()?;
    let submit = std::env::args().any(|arg| arg == "--detect");

    list_devices();

    let mut session = CameraSession::new(
        device(&config),
        config.initial_facing,
        config.preferred_width,
        config.preferred_height,
    );
    if !session.device().is_supported() {
        println!("Camera access is not supported on this system");
        return Ok(());
    }

    let mut first_frame = None;
    for facing in [FacingMode::Environment, FacingMode::User] {
        match probe(&mut session, facing, config.jpeg_quality).await {
            Ok(frame) => {
                if first_frame.is_none() {
                    first_frame = frame;
                }
            }
            Err(e) => println!("  ❌ Failed: {}", e),
        }
    }
    session.close();

    if submit {
        let Some(frame) = first_frame else {
            println!("\nNothing to submit");
            return Ok(());
        };
        println!("\nSubmitting frame to {}/detect...", config.server_url);
        let client = HttpDetectionClient::new(config.server_url.clone());
        match client.detect(frame).await {
            Ok(result) => {
                let view = present(&result);
                for row in &view.detections {
                    match row {
                        DetectionRow::Detected { class_name, confidence, tier } => {
                            println!("  {} {} ({})", class_name, confidence, tier.as_str())
                        }
                        DetectionRow::Nothing => println!("  {}", row.label()),
                    }
                }
                for metric in &view.metrics {
                    println!("  {}: {}", metric.label, metric.value);
                }
            }
            Err(e) => println!("  ❌ Detection failed: {}", e),
        }
    }

    println!("\nCamera probe complete!");
    Ok(())
}
