//! Detection loop controller
//!
//! Owns the `Stopped`/`Running` state and the detection cycle: snapshot the
//! camera, encode, post to `/detect`, render, wait, repeat. Exactly one cycle
//! is in flight per run; a new cycle is only scheduled once the previous one
//! resolved. Every `start` opens a new run epoch and a loop only keeps going
//! while its epoch is the current one, so stop followed by start never leaves
//! two loops alive.

use crate::camera::{CameraDevice, CameraError, CameraSession, FacingMode, StreamSlot};
use crate::client::{CaptureReceipt, DetectionResult, DetectionService};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::fps::{format_fps, FpsCounter};
use crate::frame::FrameSlot;
use crate::presenter::present;
use crate::renderer::{encode_jpeg, spawn_preview, SharedSurface};
use crate::ui::SharedUi;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Alert shown when the platform has no camera API
pub const CAMERA_NOT_SUPPORTED: &str = "Your system does not support camera access.";

/// Alert shown when a camera stream could not be acquired
pub fn camera_alert(message: &str) -> String {
    format!(
        "Failed to access camera: {}\n\nMake sure:\n1. Camera permission has been granted\n2. The device has a camera\n3. No other application is using the camera",
        message
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// What one detection cycle ended with
#[derive(Debug)]
pub enum CycleOutcome {
    /// The camera had no usable frame; nothing was sent
    NotReady,
    /// A result was received and rendered
    Detected,
    /// Encoding or the request failed
    Failed(Error),
}

impl CycleOutcome {
    /// Delay before the next cycle
    pub fn next_delay(&self, config: &ClientConfig) -> Duration {
        match self {
            Self::NotReady => config.not_ready_retry,
            Self::Detected | Self::Failed(_) => config.cycle_interval,
        }
    }
}

struct RunState {
    state: LoopState,
    epoch: u64,
    fps: FpsCounter,
}

impl RunState {
    fn is_current(&self, epoch: u64) -> bool {
        self.state == LoopState::Running && self.epoch == epoch
    }
}

struct Shared<D, S> {
    config: ClientConfig,
    service: S,
    camera: tokio::sync::Mutex<CameraSession<D>>,
    stream: StreamSlot,
    surface: SharedSurface,
    frames: FrameSlot,
    ui: SharedUi,
    run: Mutex<RunState>,
    preview: Mutex<Option<JoinHandle<()>>>,
    active_loops: AtomicUsize,
    // Held for a whole cycle; at most one detect request across all runs
    dispatch: tokio::sync::Mutex<()>,
}

/// Handle to the detection controller. Clones share the same controller.
pub struct DetectionController<D, S> {
    shared: Arc<Shared<D, S>>,
}

impl<D, S> Clone for DetectionController<D, S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<D: CameraDevice, S: DetectionService> DetectionController<D, S> {
    /// Wire a controller around its collaborators. Nothing is opened yet.
    pub fn create(device: D, service: S, config: ClientConfig, ui: SharedUi) -> Self {
        let session = CameraSession::new(
            device,
            config.initial_facing,
            config.preferred_width,
            config.preferred_height,
        );
        let stream = session.slot();
        let fps = FpsCounter::new(config.fps_window);
        ui.update(|s| s.facing = config.initial_facing);

        Self {
            shared: Arc::new(Shared {
                config,
                service,
                camera: tokio::sync::Mutex::new(session),
                stream,
                surface: SharedSurface::new(),
                frames: FrameSlot::new(),
                ui,
                run: Mutex::new(RunState {
                    state: LoopState::Stopped,
                    epoch: 0,
                    fps,
                }),
                preview: Mutex::new(None),
                active_loops: AtomicUsize::new(0),
                dispatch: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn service(&self) -> &S {
        &self.shared.service
    }

    pub fn ui(&self) -> &SharedUi {
        &self.shared.ui
    }

    /// Surface the preview is drawn on
    pub fn surface(&self) -> SharedSurface {
        self.shared.surface.clone()
    }

    /// Most recent frame submitted for detection
    pub fn frames(&self) -> &FrameSlot {
        &self.shared.frames
    }

    pub fn state(&self) -> LoopState {
        self.run().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Detection loops currently alive
    pub fn active_loops(&self) -> usize {
        self.shared.active_loops.load(Ordering::SeqCst)
    }

    fn run(&self) -> MutexGuard<'_, RunState> {
        self.shared.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.run().is_current(epoch)
    }

    /// Page-load equivalent: check camera support, start the preview and
    /// open the initial camera.
    pub async fn load(&self) -> Result<()> {
        let supported = self.shared.camera.lock().await.device().is_supported();
        if !supported {
            error!("No camera API available on this system");
            self.shared.ui.update(|s| {
                s.show_alert(CAMERA_NOT_SUPPORTED);
                s.set_status("Camera not supported");
                s.start_enabled = false;
                s.switch_enabled = false;
            });
            return Err(CameraError::NotSupported.into());
        }

        self.start_preview();
        self.init_camera().await
    }

    /// Start the fixed-cadence preview redraw, once.
    pub fn start_preview(&self) {
        let mut preview = self.shared.preview.lock().unwrap_or_else(PoisonError::into_inner);
        if preview.is_none() {
            *preview = Some(spawn_preview(
                self.shared.stream.clone(),
                self.shared.surface.clone(),
                self.shared.config.preview_interval,
            ));
        }
    }

    /// (Re)open the camera with the current facing mode.
    pub async fn init_camera(&self) -> Result<()> {
        let mut camera = self.shared.camera.lock().await;
        let facing = camera.facing_mode();
        let opened = camera.open(facing).await;
        drop(camera);
        self.after_open(opened, facing)
    }

    /// Toggle between the rear and the front camera.
    pub async fn switch_camera(&self) -> Result<()> {
        let mut camera = self.shared.camera.lock().await;
        let switched = camera.switch().await;
        let facing = camera.facing_mode();
        drop(camera);
        self.after_open(switched, facing)
    }

    fn after_open(&self, opened: std::result::Result<(), CameraError>, facing: FacingMode) -> Result<()> {
        let running = self.is_running();
        match opened {
            Ok(()) => {
                self.shared.ui.update(|s| {
                    s.facing = facing;
                    s.start_enabled = !running;
                    s.switch_enabled = true;
                    if !running {
                        s.set_status("Camera ready");
                    }
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to open {} camera: {}", facing.as_str(), e);
                let message = e.to_string();
                self.shared.ui.update(|s| {
                    s.facing = facing;
                    s.show_alert(camera_alert(&message));
                    s.set_status(format!("Camera error: {}", message));
                });
                Err(e.into())
            }
        }
    }

    /// Enter `Running` and schedule the first cycle.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            self.shared.ui.update(|s| s.set_status("Detecting..."));
            return Ok(());
        }

        let ready = self.shared.camera.lock().await.is_ready();
        if !ready {
            self.init_camera().await?;
        }

        let epoch = {
            let mut run = self.run();
            if run.state == LoopState::Running {
                drop(run);
                self.shared.ui.update(|s| s.set_status("Detecting..."));
                return Ok(());
            }
            run.state = LoopState::Running;
            run.epoch += 1;
            run.fps.reset(now());
            self.shared.ui.update(|s| {
                s.start_enabled = false;
                s.stop_enabled = true;
                s.set_status("Detecting...");
            });
            run.epoch
        };

        info!("Detection started (run #{})", epoch);
        let controller = self.clone();
        tokio::spawn(async move { controller.run_loop(epoch).await });
        Ok(())
    }

    /// Leave `Running`. An in-flight cycle still completes but schedules
    /// nothing after it.
    pub fn stop(&self) {
        let mut run = self.run();
        let was_running = run.state == LoopState::Running;
        run.state = LoopState::Stopped;

        self.shared.ui.update(|s| {
            s.set_status("Detection stopped");
            if was_running {
                s.start_enabled = true;
                s.stop_enabled = false;
                s.capture_enabled = false;
                s.fps_text = "0 FPS".to_string();
            }
        });
        drop(run);

        if was_running {
            info!("Detection stopped");
        }
    }

    async fn run_loop(self, epoch: u64) {
        self.shared.active_loops.fetch_add(1, Ordering::SeqCst);
        debug!("Detection loop #{} running", epoch);

        while self.is_current(epoch) {
            // A trailing cycle of the previous run may still be in flight
            let turn = self.shared.dispatch.lock().await;
            if !self.is_current(epoch) {
                break;
            }
            let outcome = self.cycle(epoch).await;
            drop(turn);
            if !self.is_current(epoch) {
                break;
            }
            tokio::time::sleep(outcome.next_delay(&self.shared.config)).await;
        }

        self.shared.active_loops.fetch_sub(1, Ordering::SeqCst);
        debug!("Detection loop #{} finished", epoch);
    }

    /// Run one detection cycle outside of the loop.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let epoch = self.run().epoch;
        let _turn = self.shared.dispatch.lock().await;
        self.cycle(epoch).await
    }

    async fn cycle(&self, epoch: u64) -> CycleOutcome {
        let Some(snapshot) = self.shared.surface.snapshot_from(&self.shared.stream) else {
            debug!("Camera has no frame yet, retrying");
            return CycleOutcome::NotReady;
        };

        let frame = match encode_jpeg(snapshot, self.shared.config.jpeg_quality).await {
            Ok(frame) => frame,
            Err(e) => return self.cycle_failed(epoch, Error::Encode(e.to_string())),
        };
        self.shared.frames.store(frame.clone());

        match self.shared.service.detect(frame).await {
            Ok(result) => {
                self.cycle_succeeded(epoch, &result);
                CycleOutcome::Detected
            }
            Err(e) => self.cycle_failed(epoch, Error::DetectionRequestFailed(e.to_string())),
        }
    }

    fn cycle_succeeded(&self, epoch: u64, result: &DetectionResult) {
        debug!(
            "Detection result: {} detections in {:.1}ms",
            result.detections.len(),
            result.inference_time_ms
        );
        let view = present(result);

        let mut run = self.run();
        let current = run.is_current(epoch);
        let published = if current { run.fps.record(now()) } else { None };
        self.shared.ui.update(|s| {
            s.show_result(view);
            if current {
                s.capture_enabled = true;
                if let Some(rate) = published {
                    s.fps_text = format_fps(rate);
                }
            }
        });
    }

    fn cycle_failed(&self, epoch: u64, err: Error) -> CycleOutcome {
        warn!("Detection cycle failed: {}", err);
        let run = self.run();
        if run.is_current(epoch) {
            let status = format!("Error: {}", err);
            self.shared.ui.update(|s| s.set_status(status));
        }
        CycleOutcome::Failed(err)
    }

    /// Persist the most recently submitted frame.
    pub async fn capture(&self) -> Result<CaptureReceipt> {
        let Some(frame) = self.shared.frames.latest() else {
            let err = Error::NoFrameAvailable;
            self.shared.ui.update(|s| s.show_alert(err.to_string()));
            return Err(err);
        };

        self.shared.ui.update(|s| s.loading = true);
        let saved = self.shared.service.capture(frame).await;
        self.shared.ui.update(|s| s.loading = false);

        match saved {
            Ok(receipt) => {
                info!("Capture saved as {}", receipt.capture_id);
                let message = format!("Capture saved! ({})", receipt.capture_id);
                let generation = self.shared.ui.update(|s| s.show_toast(message));

                let ui = self.shared.ui.clone();
                let linger = self.shared.config.toast_duration;
                tokio::spawn(async move {
                    tokio::time::sleep(linger).await;
                    ui.update(|s| s.dismiss_toast(generation));
                });
                Ok(receipt)
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Capture failed: {}", message);
                self.shared
                    .ui
                    .update(|s| s.show_alert(format!("Failed to save capture: {}", message)));
                Err(Error::CaptureRequestFailed(message))
            }
        }
    }

    /// Page-unload equivalent: stop the loop and the preview, release the camera.
    pub async fn dispose(&self) {
        self.stop();
        let preview = self
            .shared
            .preview
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(preview) = preview {
            preview.abort();
        }
        self.shared.camera.lock().await.close();
        info!("Controller disposed");
    }
}

/// Wall clock that follows tokio's test clock when it is paused
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
