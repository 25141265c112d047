//! TiledImageWidget - A self-contained egui widget for deep-zoom tiled images
//!
//! The widget owns a [`TiledViewer`] and a [`FetchLoader`]. Each frame it turns
//! pointer, wheel, pinch and keyboard input into viewer calls, uploads tiles
//! that finished downloading, paints the visible tiles and draws the overlays.
//! Multiple instances can be used side-by-side without sharing state.

use std::time::Duration;

use egui::{Color32, Key, PointerButton, Pos2, Rect, Response, TextureHandle, TextureOptions, Ui, Vec2};

use crate::cache::TileState;
use crate::config::ViewerConfig;
use crate::error::Result;
use crate::events::ViewerEvent;
use crate::fetch::FetchLoader;
use crate::input::InputAdapter;
use crate::pyramid::{PyramidMetadata, TileKey};
use crate::url::TileUrlProvider;
use crate::viewer::TiledViewer;
use crate::zoom::{ZoomLimit, ZoomOutcome, ZoomTarget};

/// Duration to show zoom level overlay after zooming
const ZOOM_OVERLAY_DURATION: f64 = 0.8;
/// Duration to show the zoom limit message
const LIMIT_OVERLAY_DURATION: f64 = 1.5;
/// Pixels moved per arrow key press
const KEY_PAN_STEP: f64 = 64.0;

/// Actions returned from zoom controls overlay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ZoomAction {
    None,
    ZoomIn,
    ZoomOut,
    Fit,
}

/// A self-contained widget for viewing one tiled image pyramid.
pub struct TiledImageWidget {
    viewer: TiledViewer<TextureHandle>,
    loader: FetchLoader,
    /// Context of the frame loop, known after the first `show`
    ctx: Option<egui::Context>,
    /// Frame time of the last `show`, used for calls made between frames
    now: f64,
    /// Events waiting for the host
    events: Vec<ViewerEvent>,
    /// Track when zoom was last changed (for overlay display)
    zoom_changed_time: Option<f64>,
    /// Last refused zoom request and when it happened
    limit_hit: Option<(ZoomLimit, f64)>,
}

impl TiledImageWidget {
    pub fn new(metadata: PyramidMetadata, provider: Box<dyn TileUrlProvider>, config: &ViewerConfig) -> Result<Self> {
        Ok(Self {
            viewer: TiledViewer::new(metadata, provider, config)?,
            loader: FetchLoader::new(None),
            ctx: None,
            now: 0.0,
            events: Vec::new(),
            zoom_changed_time: None,
            limit_hit: None,
        })
    }

    // =========================================================================
    // Public API (called from outside, e.g., from JS via ViewerHandle)
    // =========================================================================

    pub fn viewer(&self) -> &TiledViewer<TextureHandle> {
        &self.viewer
    }

    /// Zoom in one step around the viewport centre
    pub fn zoom_in(&mut self) -> ZoomOutcome {
        let center = self.viewer.viewport().center();
        let outcome = self.viewer.zoom_by(1, center, self.now);
        self.request_repaint();
        outcome
    }

    /// Zoom out one step around the viewport centre
    pub fn zoom_out(&mut self) -> ZoomOutcome {
        let center = self.viewer.viewport().center();
        let outcome = self.viewer.zoom_by(-1, center, self.now);
        self.request_repaint();
        outcome
    }

    pub fn zoom_to(&mut self, target: ZoomTarget) -> ZoomOutcome {
        let center = self.viewer.viewport().center();
        let outcome = self.viewer.zoom_to(target, center, self.now);
        self.request_repaint();
        outcome
    }

    pub fn zoom_to_fit(&mut self) -> ZoomOutcome {
        let outcome = self.viewer.zoom_to_fit(false, self.now);
        self.request_repaint();
        outcome
    }

    pub fn zoom_actual_size(&mut self) -> ZoomOutcome {
        let outcome = self.viewer.zoom_actual_size(self.now);
        self.request_repaint();
        outcome
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewer.pan_by(dx, dy, self.now);
        self.request_repaint();
    }

    pub fn center_on(&mut self, image_x: f64, image_y: f64) {
        self.viewer.center_on(image_x, image_y, self.now);
        self.request_repaint();
    }

    /// Drop every cached tile and fetch the visible ones again
    pub fn invalidate_tiles(&mut self) {
        self.viewer.invalidate_all(self.now, &mut self.loader);
        self.request_repaint();
    }

    pub fn invalidate_tile(&mut self, key: TileKey) -> bool {
        let removed = self.viewer.invalidate(key, self.now, &mut self.loader);
        self.request_repaint();
        removed
    }

    pub fn zoom_level(&self) -> u32 {
        self.viewer.viewport().zoom_level
    }

    pub fn scale(&self) -> f64 {
        self.viewer.viewport().scale
    }

    /// Events since the last call, oldest first
    pub fn take_events(&mut self) -> Vec<ViewerEvent> {
        self.collect_events();
        std::mem::take(&mut self.events)
    }

    fn request_repaint(&self) {
        if let Some(ctx) = &self.ctx {
            ctx.request_repaint();
        }
    }

    fn collect_events(&mut self) {
        for event in self.viewer.take_events() {
            match event {
                ViewerEvent::Zoomed { .. } => self.zoom_changed_time = Some(self.now),
                ViewerEvent::ZoomLimitReached(limit) => self.limit_hit = Some((limit, self.now)),
                _ => {}
            }
            self.events.push(event);
        }
    }

    // =========================================================================
    // Main rendering
    // =========================================================================

    /// Show the widget, rendering into the given UI with a specified container size.
    pub fn show(&mut self, ui: &mut Ui, container_size: Vec2) -> Response {
        let ctx = ui.ctx().clone();
        if self.ctx.is_none() {
            self.ctx = Some(ctx.clone());
            self.loader.set_context(ctx.clone());
        }
        let now = ctx.input(|i| i.time);
        self.now = now;

        self.receive_tiles(&ctx);

        // Allocate space for the widget
        let (rect, response) = ui.allocate_exact_size(container_size, egui::Sense::click_and_drag());
        self.viewer.resize(rect.width() as f64, rect.height() as f64, now);

        self.handle_pointer_input(ui, &response, rect);
        if response.hovered() || response.has_focus() {
            self.handle_keyboard_input(&ctx);
        }

        self.viewer.update(now, &mut self.loader);
        self.paint_tiles(ui, rect);
        self.collect_events();

        // Render overlays, collecting actions to apply after rendering
        let zoom_action = self.render_zoom_controls(&ctx, response.id, rect);
        self.render_zoom_info_overlay(&ctx, response.id, rect);
        self.render_limit_overlay(&ctx, response.id, rect);

        match zoom_action {
            ZoomAction::None => {}
            ZoomAction::ZoomIn => {
                self.zoom_in();
            }
            ZoomAction::ZoomOut => {
                self.zoom_out();
            }
            ZoomAction::Fit => {
                self.zoom_to_fit();
            }
        }

        self.schedule_repaint(&ctx);
        response
    }

    /// Upload finished downloads as textures and report them to the viewer
    fn receive_tiles(&mut self, ctx: &egui::Context) {
        for result in self.loader.drain() {
            match result.image {
                Ok(image) => {
                    let name = format!("tile-{}-{}-{}", result.key.level, result.key.x, result.key.y);
                    let texture = ctx.load_texture(name, image, TextureOptions::LINEAR);
                    self.viewer.on_tile_loaded(result.key, &result.url, texture);
                }
                Err(err) => {
                    log::debug!("Tile {:?}: {}", result.key, err);
                    self.viewer.on_tile_failed(result.key, &result.url, self.now);
                }
            }
        }
    }

    fn handle_pointer_input(&mut self, ui: &Ui, response: &Response, rect: Rect) {
        let now = self.now;
        let local = |p: Pos2| ((p.x - rect.min.x) as f64, (p.y - rect.min.y) as f64);
        let panning = |r: &Response| r.dragged_by(PointerButton::Primary) || r.dragged_by(PointerButton::Middle);

        // Handle pan via drag
        if response.drag_started_by(PointerButton::Primary) || response.drag_started_by(PointerButton::Middle) {
            if let Some(origin) = ui.input(|i| i.pointer.press_origin()) {
                let (x, y) = local(origin);
                self.viewer.on_pan_start(x, y, now);
            }
        }
        if panning(response) {
            if let Some(pos) = response.interact_pointer_pos() {
                let (x, y) = local(pos);
                self.viewer.on_pan_move(x, y, now);
            }
        }
        if response.drag_stopped() {
            self.viewer.on_pan_end(now);
        }

        // Double-click zooms in at the pointer
        if response.double_clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.viewer.zoom_by(1, local(pos), now);
            }
        }

        let Some(pointer_pos) = ui.input(|i| i.pointer.latest_pos()) else {
            return;
        };
        if !rect.contains(pointer_pos) {
            return;
        }

        // Pinch or ctrl+wheel
        let zoom_delta = ui.input(|i| i.zoom_delta());
        if zoom_delta != 1.0 {
            self.viewer.on_zoom_gesture(zoom_delta as f64, local(pointer_pos), now);
        }

        // Plain scroll wheel steps the zoom
        let scroll_delta = ui.input(|i| i.raw_scroll_delta);
        if scroll_delta.y != 0.0 && zoom_delta == 1.0 {
            let direction = if scroll_delta.y > 0.0 { 1 } else { -1 };
            self.viewer.zoom_by(direction, local(pointer_pos), now);
        }
    }

    /// Handle keyboard shortcuts for zoom and pan
    fn handle_keyboard_input(&mut self, ctx: &egui::Context) {
        let now = self.now;
        let center = self.viewer.viewport().center();

        ctx.input(|i| {
            // Zoom in: = or + (numpad)
            if i.key_pressed(Key::Equals) || i.key_pressed(Key::Plus) {
                self.viewer.zoom_by(1, center, now);
            }
            if i.key_pressed(Key::Minus) {
                self.viewer.zoom_by(-1, center, now);
            }
            if i.key_pressed(Key::Num0) {
                self.viewer.zoom_to_fit(false, now);
            }
            if i.key_pressed(Key::Num1) {
                self.viewer.zoom_actual_size(now);
            }

            let (dx, dy) = arrow_pan(
                i.key_pressed(Key::ArrowLeft),
                i.key_pressed(Key::ArrowRight),
                i.key_pressed(Key::ArrowUp),
                i.key_pressed(Key::ArrowDown),
            );
            if dx != 0.0 || dy != 0.0 {
                self.viewer.pan_by(dx, dy, now);
            }
        });
    }

    fn paint_tiles(&self, ui: &Ui, rect: Rect) {
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, ui.visuals().extreme_bg_color);

        let uv = Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
        for placement in self.viewer.placements() {
            let (x, y, w, h) = placement.rect;
            let tile_rect = Rect::from_min_size(
                rect.min + egui::vec2(x as f32, y as f32),
                egui::vec2(w as f32, h as f32),
            );
            match placement.resource {
                Some(texture) => {
                    painter.image(texture.id(), tile_rect, uv, Color32::WHITE);
                }
                None => {
                    painter.rect_filled(tile_rect, 0.0, placeholder_color(ui, placement.state));
                }
            }
        }
    }

    /// Wake up for the next debounce deadline, retry or overlay expiry
    fn schedule_repaint(&self, ctx: &egui::Context) {
        let overlay_until = [
            self.zoom_changed_time.map(|t| t + ZOOM_OVERLAY_DURATION),
            self.limit_hit.map(|(_, t)| t + LIMIT_OVERLAY_DURATION),
        ]
        .into_iter()
        .flatten()
        .filter(|&t| t > self.now);

        let next = self
            .viewer
            .next_wakeup()
            .into_iter()
            .chain(overlay_until)
            .min_by(|a, b| a.total_cmp(b));

        if let Some(at) = next {
            ctx.request_repaint_after(Duration::from_secs_f64((at - self.now).max(0.0)));
        }
    }

    /// Render zoom control buttons at bottom-right of widget.
    /// Returns an action to be applied after rendering.
    fn render_zoom_controls(&self, ctx: &egui::Context, id: egui::Id, widget_rect: Rect) -> ZoomAction {
        let button_size = egui::vec2(28.0, 28.0);
        let margin = 10.0;
        let spacing = 4.0;

        let num_buttons = 3.0;
        let base_x = widget_rect.max.x - margin - button_size.x * num_buttons - spacing * (num_buttons - 1.0);
        let base_y = widget_rect.max.y - margin - button_size.y;

        let zoom = self.viewer.zoom_controller();
        let can_zoom_in = zoom.can_zoom_in(self.viewer.viewport(), self.viewer.pyramid());
        let can_zoom_out = zoom.can_zoom_out(self.viewer.viewport(), self.viewer.pyramid());

        let mut action = ZoomAction::None;

        egui::Area::new(id.with("zoom_controls"))
            .fixed_pos(egui::pos2(base_x, base_y))
            .show(ctx, |ui| {
                let text_color = get_overlay_text_color(ui);

                overlay_frame(ui).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.spacing_mut().item_spacing.x = spacing;

                        let fit_btn = egui::Button::new(egui::RichText::new("⤢").color(text_color))
                            .fill(Color32::TRANSPARENT);
                        if ui.add_sized(button_size, fit_btn).on_hover_text("Fit to view").clicked() {
                            action = ZoomAction::Fit;
                        }

                        let minus_color = dimmed_unless(text_color, can_zoom_out);
                        let minus_btn = egui::Button::new(egui::RichText::new("−").color(minus_color))
                            .fill(Color32::TRANSPARENT);
                        if ui.add_sized(button_size, minus_btn).clicked() {
                            action = ZoomAction::ZoomOut;
                        }

                        let plus_color = dimmed_unless(text_color, can_zoom_in);
                        let plus_btn = egui::Button::new(egui::RichText::new("+").color(plus_color))
                            .fill(Color32::TRANSPARENT);
                        if ui.add_sized(button_size, plus_btn).clicked() {
                            action = ZoomAction::ZoomIn;
                        }
                    });
                });
            });

        action
    }

    /// Render zoom level overlay while zooming
    fn render_zoom_info_overlay(&self, ctx: &egui::Context, id: egui::Id, widget_rect: Rect) {
        let should_show = match self.zoom_changed_time {
            Some(changed_time) => (self.now - changed_time) < ZOOM_OVERLAY_DURATION,
            None => false,
        };
        if !should_show {
            return;
        }

        let viewport = self.viewer.viewport();
        let zoom_text = format_zoom(viewport.scale, viewport.zoom_level);

        egui::Area::new(id.with("zoom_info_overlay"))
            .fixed_pos(egui::pos2(widget_rect.center().x - 60.0, widget_rect.center().y - 20.0))
            .show(ctx, |ui| {
                let text_color = get_overlay_text_color(ui);
                overlay_frame(ui).show(ui, |ui| {
                    ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend);
                    ui.label(egui::RichText::new(zoom_text).color(text_color).size(24.0));
                });
            });
    }

    /// Render an advisory message after a zoom request hit a limit
    fn render_limit_overlay(&self, ctx: &egui::Context, id: egui::Id, widget_rect: Rect) {
        let Some((limit, at)) = self.limit_hit else {
            return;
        };
        if !self.viewer.zoom_controller().reports_limits() || self.now - at >= LIMIT_OVERLAY_DURATION {
            return;
        }

        let message = match limit {
            ZoomLimit::Min => "Already at the lowest zoom",
            ZoomLimit::Max => "Already at the highest zoom",
        };

        egui::Area::new(id.with("zoom_limit_overlay"))
            .fixed_pos(egui::pos2(widget_rect.center().x - 90.0, widget_rect.min.y + 40.0))
            .show(ctx, |ui| {
                let text_color = get_overlay_text_color(ui);
                overlay_frame(ui).show(ui, |ui| {
                    ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend);
                    ui.label(egui::RichText::new(message).color(text_color));
                });
            });
    }
}

/// Pan delta for the arrow keys; the image moves opposite to the view
fn arrow_pan(left: bool, right: bool, up: bool, down: bool) -> (f64, f64) {
    let axis = |neg: bool, pos: bool| match (neg, pos) {
        (true, false) => KEY_PAN_STEP,
        (false, true) => -KEY_PAN_STEP,
        _ => 0.0,
    };
    (axis(left, right), axis(up, down))
}

fn placeholder_color(ui: &Ui, state: TileState) -> Color32 {
    let base = ui.visuals().faint_bg_color;
    match state {
        TileState::Pending => base,
        TileState::Failed | TileState::Placeholder => base.gamma_multiply(0.5),
        TileState::Loaded => Color32::TRANSPARENT,
    }
}

fn dimmed_unless(color: Color32, enabled: bool) -> Color32 {
    if enabled {
        color
    } else {
        color.gamma_multiply(0.3)
    }
}

/// Get a translucent background color appropriate for light/dark mode
fn get_overlay_bg(ui: &Ui) -> Color32 {
    if ui.visuals().dark_mode {
        Color32::from_black_alpha(180)
    } else {
        Color32::from_white_alpha(220)
    }
}

/// Get text color appropriate for light/dark mode overlays
fn get_overlay_text_color(ui: &Ui) -> Color32 {
    if ui.visuals().dark_mode {
        Color32::WHITE
    } else {
        Color32::from_gray(30)
    }
}

fn overlay_frame(ui: &Ui) -> egui::Frame {
    egui::Frame::popup(ui.style()).fill(get_overlay_bg(ui))
}

/// Display percent, with the zoom index for reference
fn format_zoom(scale: f64, level: u32) -> String {
    let percent = scale * 100.0;
    if percent < 10.0 {
        format!("{:.1}% (L{})", percent, level)
    } else {
        format!("{:.0}% (L{})", percent, level)
    }
}
