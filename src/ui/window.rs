//! Desktop window: live preview, controls and the detection result panel.
//!
//! Runs its own GLFW/glow event loop on a dedicated thread. It never touches
//! the controller directly; it reads [`SharedUi`] and the preview surface and
//! sends [`UiCommand`]s back.

use super::{SharedUi, UiCommand, UiState};
use crate::presenter::{ConfidenceTier, DetectionRow, FeedbackTone};
use crate::renderer::SharedSurface;
use anyhow::anyhow;
use egui::{Color32, ColorImage, Context, RichText, Stroke, TextureHandle, TextureOptions, Vec2};
use egui_glow::Painter;
use egui_window_glfw_passthrough::glfw::Context as GlfwContext;
use egui_window_glfw_passthrough::{glfw, GlfwBackend, GlfwConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

const WINDOW_WIDTH: i32 = 1280;
const WINDOW_HEIGHT: i32 = 820;

/// Texture uploaded from the CPU side, re-uploaded when `revision` moves
struct CachedTexture {
    handle: Option<TextureHandle>,
    revision: u64,
}

impl CachedTexture {
    fn new() -> Self {
        Self {
            handle: None,
            revision: u64::MAX,
        }
    }

    fn update(&mut self, ctx: &Context, name: &str, revision: u64, image: impl FnOnce() -> Option<ColorImage>) {
        if self.revision == revision {
            return;
        }
        self.revision = revision;
        match image() {
            Some(image) => match &mut self.handle {
                Some(handle) => handle.set(image, TextureOptions::LINEAR),
                None => self.handle = Some(ctx.load_texture(name, image, TextureOptions::LINEAR)),
            },
            None => self.handle = None,
        }
    }
}

pub struct WindowApp {
    ui: SharedUi,
    surface: SharedSurface,
    commands: UnboundedSender<UiCommand>,
}

impl WindowApp {
    pub fn new(ui: SharedUi, surface: SharedSurface, commands: UnboundedSender<UiCommand>) -> Self {
        Self {
            ui,
            surface,
            commands,
        }
    }

    fn send(&self, command: UiCommand) {
        if self.commands.send(command).is_err() {
            warn!("Command loop is gone, dropping {:?}", command);
        }
    }

    /// Run the window until it is closed. Sends `Quit` on the way out.
    #[allow(unsafe_code)]
    pub fn run(self) -> anyhow::Result<()> {
        let config = GlfwConfig {
            window_title: "Leaf Disease Detection".to_string(),
            size: [WINDOW_WIDTH as u32, WINDOW_HEIGHT as u32],
            transparent_window: Some(false),
            opengl_window: Some(true),
            glfw_callback: Box::new(|glfw: &mut glfw::Glfw| {
                glfw.window_hint(glfw::WindowHint::Decorated(true));
                glfw.window_hint(glfw::WindowHint::Resizable(true));
                glfw.window_hint(glfw::WindowHint::DepthBits(Some(0)));
                glfw.window_hint(glfw::WindowHint::StencilBits(Some(0)));
                glfw.window_hint(glfw::WindowHint::FocusOnShow(true));
            }),
            window_callback: Box::new(|window| {
                window.set_pos(80, 60);
            }),
        };

        let mut backend = GlfwBackend::new(config);
        backend.set_passthrough(false);
        backend.window.set_all_polling(true);
        backend.window.show();
        backend.window.focus();

        let gl = unsafe {
            let gl = egui_glow::glow::Context::from_loader_function(|s| {
                backend.window.get_proc_address(s) as *const _
            });
            Arc::new(gl)
        };
        let mut painter = Painter::new(gl, "", None, false).map_err(|e| anyhow!("Failed to create painter: {}", e))?;

        let ctx = Context::default();
        configure_style(&ctx);
        info!("Window opened");

        let mut preview = CachedTexture::new();
        let mut annotated = CachedTexture::new();

        while !backend.window.should_close() {
            backend.glfw.poll_events();
            backend.tick();
            let raw_input = backend.take_raw_input();

            for event in &raw_input.events {
                if let egui::Event::Key {
                    key: egui::Key::Escape,
                    pressed: true,
                    ..
                } = event
                {
                    backend.window.set_should_close(true);
                }
            }

            unsafe {
                use egui_glow::glow::HasContext;
                painter.gl().clear_color(0.07, 0.08, 0.07, 1.0);
                painter.gl().clear(egui_glow::glow::COLOR_BUFFER_BIT);
            }

            let output = ctx.run(raw_input, |ctx| {
                ctx.request_repaint_after(Duration::from_millis(33));

                let revision = self.surface.lock().revision();
                preview.update(ctx, "preview", revision, || {
                    let surface = self.surface.lock();
                    let canvas = surface.canvas();
                    if canvas.width() == 0 || canvas.height() == 0 {
                        return None;
                    }
                    Some(ColorImage::from_rgb(
                        [canvas.width() as usize, canvas.height() as usize],
                        canvas.as_raw(),
                    ))
                });

                let mut pressed = Vec::new();
                {
                    let state = self.ui.lock();
                    annotated.update(ctx, "annotated", state.result_revision, || {
                        let jpeg = state.result.as_ref()?.annotated_jpeg.as_ref()?;
                        decode_jpeg(jpeg)
                    });

                    egui::SidePanel::left("camera")
                        .resizable(false)
                        .exact_width(WINDOW_WIDTH as f32 * 0.45)
                        .show(ctx, |ui| camera_panel(ui, &state, preview.handle.as_ref(), &mut pressed));

                    egui::CentralPanel::default()
                        .show(ctx, |ui| result_panel(ui, &state, annotated.handle.as_ref()));

                    overlays(ctx, &state, &mut pressed);
                }

                for command in pressed {
                    self.send(command);
                }
            });

            let clipped_primitives = ctx.tessellate(output.shapes, output.pixels_per_point);
            let (fb_width, fb_height) = backend.window.get_framebuffer_size();
            painter.paint_and_update_textures(
                [fb_width as u32, fb_height as u32],
                output.pixels_per_point,
                &clipped_primitives,
                &output.textures_delta,
            );
            backend.window.swap_buffers();

            std::thread::sleep(Duration::from_millis(10));
        }

        painter.destroy();
        info!("Window closed");
        self.send(UiCommand::Quit);
        Ok(())
    }
}

fn decode_jpeg(jpeg: &[u8]) -> Option<ColorImage> {
    match image::load_from_memory(jpeg) {
        Ok(decoded) => {
            let rgb = decoded.to_rgb8();
            Some(ColorImage::from_rgb(
                [rgb.width() as usize, rgb.height() as usize],
                rgb.as_raw(),
            ))
        }
        Err(e) => {
            debug!("Annotated image could not be decoded: {}", e);
            None
        }
    }
}

/// Scale `size` down to fit `max_width`, keeping the aspect ratio.
fn fit_width(size: Vec2, max_width: f32) -> Vec2 {
    if size.x <= max_width || size.x <= 0.0 {
        size
    } else {
        size * (max_width / size.x)
    }
}

fn camera_panel(ui: &mut egui::Ui, state: &UiState, preview: Option<&TextureHandle>, pressed: &mut Vec<UiCommand>) {
    ui.add_space(8.0);
    ui.heading("Camera");
    ui.add_space(6.0);

    let max_height = ui.available_height() - 140.0;
    match preview {
        Some(texture) => {
            let mut size = fit_width(texture.size_vec2(), ui.available_width());
            if size.y > max_height && max_height > 0.0 {
                size *= max_height / size.y;
            }
            ui.image((texture.id(), size));
        }
        None => {
            ui.allocate_ui(Vec2::new(ui.available_width(), 240.0), |ui| {
                ui.centered_and_justified(|ui| {
                    ui.label(RichText::new("Waiting for camera...").color(Color32::from_gray(120)));
                });
            });
        }
    }

    ui.add_space(8.0);
    ui.horizontal(|ui| {
        ui.label(RichText::new(&state.status_text).size(15.0));
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(RichText::new(&state.fps_text).monospace().color(Color32::from_rgb(150, 220, 150)));
        });
    });

    ui.add_space(8.0);
    ui.horizontal(|ui| {
        if ui.add_enabled(state.start_enabled, egui::Button::new("Start")).clicked() {
            pressed.push(UiCommand::Start);
        }
        if ui.add_enabled(state.stop_enabled, egui::Button::new("Stop")).clicked() {
            pressed.push(UiCommand::Stop);
        }
        if ui.add_enabled(state.capture_enabled, egui::Button::new("Capture")).clicked() {
            pressed.push(UiCommand::Capture);
        }
        if ui.add_enabled(state.switch_enabled, egui::Button::new("Switch camera")).clicked() {
            pressed.push(UiCommand::SwitchCamera);
        }
    });

    ui.add_space(6.0);
    ui.label(
        RichText::new(format!("Facing: {}", state.facing.as_str()))
            .size(12.0)
            .color(Color32::from_gray(140)),
    );
    if let Some(service) = &state.service_status {
        ui.label(RichText::new(service).size(12.0).color(Color32::from_gray(140)));
    }
    if !state.model_classes.is_empty() {
        egui::CollapsingHeader::new(format!("Known classes ({})", state.model_classes.len()))
            .default_open(false)
            .show(ui, |ui| {
                for class in &state.model_classes {
                    ui.label(RichText::new(class).size(12.0));
                }
            });
    }
}

fn tier_color(tier: ConfidenceTier) -> Color32 {
    match tier {
        ConfidenceTier::High => Color32::from_rgb(110, 210, 120),
        ConfidenceTier::Medium => Color32::from_rgb(235, 190, 80),
        ConfidenceTier::Low => Color32::from_rgb(170, 170, 170),
    }
}

fn tone_color(tone: FeedbackTone) -> Color32 {
    match tone {
        FeedbackTone::Warning => Color32::from_rgb(240, 180, 80),
        FeedbackTone::Success => Color32::from_rgb(120, 210, 130),
        FeedbackTone::Info => Color32::from_rgb(130, 180, 240),
        FeedbackTone::Neutral => Color32::from_gray(210),
    }
}

fn result_panel(ui: &mut egui::Ui, state: &UiState, annotated: Option<&TextureHandle>) {
    ui.add_space(8.0);
    ui.heading("Detection result");
    ui.add_space(6.0);

    let Some(view) = &state.result else {
        ui.vertical_centered(|ui| {
            ui.add_space(60.0);
            ui.label(
                RichText::new("No results yet. Press Start to begin detection.")
                    .italics()
                    .color(Color32::from_gray(120)),
            );
        });
        return;
    };

    egui::ScrollArea::vertical().auto_shrink([false; 2]).show(ui, |ui| {
        if let Some(texture) = annotated {
            let size = fit_width(texture.size_vec2(), ui.available_width());
            ui.image((texture.id(), size));
            ui.add_space(8.0);
        }

        ui.label(RichText::new("Detections").strong());
        for row in &view.detections {
            ui.horizontal(|ui| match row {
                DetectionRow::Detected { class_name, confidence, tier } => {
                    ui.label(class_name);
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.label(RichText::new(confidence).strong().color(tier_color(*tier)));
                    });
                }
                DetectionRow::Nothing => {
                    ui.label(RichText::new(row.label()).italics().color(Color32::from_gray(150)));
                }
            });
        }

        if !view.critique.is_empty() {
            ui.add_space(8.0);
            ui.label(RichText::new("Critique").strong());
            for line in &view.critique {
                ui.label(RichText::new(&line.text).color(tone_color(line.tone)));
            }
        }

        if !view.suggestions.is_empty() {
            ui.add_space(8.0);
            ui.label(RichText::new("Suggestions").strong());
            for suggestion in &view.suggestions {
                ui.label(suggestion);
            }
        }

        if !view.metrics.is_empty() {
            ui.add_space(8.0);
            ui.label(RichText::new("Metrics").strong());
            egui::Grid::new("metrics").num_columns(2).striped(true).show(ui, |ui| {
                for metric in &view.metrics {
                    ui.label(RichText::new(metric.label).color(Color32::from_gray(160)));
                    ui.label(RichText::new(&metric.value).monospace());
                    ui.end_row();
                }
            });
        }

        if let Some(disclaimer) = &view.disclaimer {
            ui.add_space(10.0);
            ui.label(RichText::new(disclaimer).size(11.0).italics().color(Color32::from_gray(130)));
        }
    });
}

fn overlays(ctx: &Context, state: &UiState, pressed: &mut Vec<UiCommand>) {
    if state.loading {
        egui::Area::new(egui::Id::new("loading"))
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(Color32::from_rgba_premultiplied(0, 0, 0, 200))
                    .rounding(8.0)
                    .inner_margin(egui::Margin::same(16.0))
                    .show(ui, |ui| {
                        ui.horizontal(|ui| {
                            ui.add(egui::Spinner::new());
                            ui.label("Saving capture...");
                        });
                    });
            });
    }

    if let Some(toast) = &state.toast {
        egui::Area::new(egui::Id::new("toast"))
            .anchor(egui::Align2::CENTER_BOTTOM, [0.0, -24.0])
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(Color32::from_rgb(40, 110, 60))
                    .rounding(6.0)
                    .inner_margin(egui::Margin::symmetric(14.0, 8.0))
                    .show(ui, |ui| {
                        ui.label(RichText::new(&toast.message).color(Color32::WHITE));
                    });
            });
    }

    if let Some(alert) = &state.alert {
        egui::Window::new("Alert")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(alert);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    pressed.push(UiCommand::DismissAlert);
                }
            });
    }
}

fn configure_style(ctx: &Context) {
    let mut style = (*ctx.style()).clone();
    style.visuals.dark_mode = true;
    style.visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, Color32::from_rgb(230, 235, 230));
    style.visuals.widgets.inactive.bg_fill = Color32::from_rgb(45, 70, 50);
    style.visuals.widgets.hovered.bg_fill = Color32::from_rgb(60, 95, 65);
    style.visuals.widgets.active.bg_fill = Color32::from_rgb(75, 120, 80);
    style.spacing.item_spacing = Vec2::new(8.0, 6.0);
    style.spacing.button_padding = Vec2::new(12.0, 6.0);
    ctx.set_style(style);
}

/// Launch the window on its own thread.
pub fn launch_window(
    ui: SharedUi,
    surface: SharedSurface,
    commands: UnboundedSender<UiCommand>,
) -> std::thread::JoinHandle<()> {
    let app = WindowApp::new(ui, surface, commands.clone());
    std::thread::spawn(move || {
        if let Err(e) = app.run() {
            error!("Window error: {}", e);
            let _ = commands.send(UiCommand::Quit);
        }
    })
}
