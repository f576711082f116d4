use crate::capture::Anchor;
use crate::events::SessionId;
use crate::notify;
use eframe::egui::{self, Color32, Pos2, Vec2};
use egui_phosphor::regular as icons;
use std::time::{Duration, Instant};

pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(200);
pub const FOCUS_RECHECK: Duration = Duration::from_millis(100);
pub const LOADING_TEXT: &str = "Analyzing image…";
pub const NOTHING_TO_COPY: &str = "Nothing to copy yet";

const CHAR_WIDTH: f32 = 10.0;
const LINE_HEIGHT: f32 = 22.0;
const MIN_TEXT: Vec2 = Vec2::new(300.0, 120.0);
const PADDING: f32 = 20.0;
const SCROLLBAR: f32 = 20.0;
const CHROME_HEIGHT: f32 = 80.0;
const MIN_WINDOW: Vec2 = Vec2::new(350.0, 150.0);
const MAX_SCREEN_WIDTH: f32 = 0.8;
const MAX_SCREEN_HEIGHT: f32 = 0.7;
const WIDTH_HYSTERESIS: f32 = 30.0;
const HEIGHT_HYSTERESIS: f32 = 20.0;

/// Outer window rectangle in physical screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupGeometry {
    pub position: Pos2,
    pub size: Vec2,
}

/// Window size for `text`, estimated from the longest line and line count.
pub fn popup_size(text: &str, screen: Vec2) -> Vec2 {
    let longest = text.split('\n').map(|l| l.chars().count()).max().unwrap_or(0);
    let lines = text.split('\n').count();
    let text_w = (longest as f32 * CHAR_WIDTH).max(MIN_TEXT.x);
    let text_h = (lines as f32 * LINE_HEIGHT).max(MIN_TEXT.y);
    let width = (text_w + 3.0 * PADDING + SCROLLBAR)
        .max(MIN_WINDOW.x)
        .min(screen.x * MAX_SCREEN_WIDTH);
    let height = (text_h + CHROME_HEIGHT)
        .max(MIN_WINDOW.y)
        .min(screen.y * MAX_SCREEN_HEIGHT);
    Vec2::new(width, height)
}

/// Places the popup just right of the anchor, pulled back inside the screen.
pub fn popup_position(anchor: Anchor, size: Vec2, screen: Vec2) -> Pos2 {
    let x = (anchor.x as f32 + 10.0).max(0.0).min(screen.x - size.x);
    let y = (anchor.y as f32).max(0.0).min(screen.y - size.y);
    Pos2::new(x, y)
}

pub fn needs_resize(applied: Option<Vec2>, wanted: Vec2) -> bool {
    match applied {
        None => true,
        Some(current) => {
            (wanted.x - current.x).abs() > WIDTH_HYSTERESIS
                || (wanted.y - current.y).abs() > HEIGHT_HYSTERESIS
        }
    }
}

/// Transient result window for one session.
pub struct Popup {
    session: SessionId,
    anchor: Anchor,
    screen: Vec2,
    opacity: f32,
    text: String,
    loading: bool,
    whole: bool,
    initial: PopupGeometry,
    applied_size: Option<Vec2>,
    resize_due: Option<Instant>,
    had_focus: bool,
    focus_requested: bool,
    blurred_at: Option<Instant>,
    notice: Option<String>,
}

impl Popup {
    pub fn new(session: SessionId, anchor: Anchor, screen: Vec2, opacity: f32) -> Self {
        let size = popup_size(LOADING_TEXT, screen);
        let initial = PopupGeometry {
            position: popup_position(anchor, size, screen),
            size,
        };
        Self {
            session,
            anchor,
            screen,
            opacity,
            text: String::new(),
            loading: true,
            whole: false,
            initial,
            applied_size: Some(size),
            resize_due: None,
            had_focus: false,
            focus_requested: false,
            blurred_at: None,
            notice: None,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn text(&self) -> &str {
        if self.loading {
            LOADING_TEXT
        } else {
            &self.text
        }
    }

    #[cfg(test)]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// First fragment of the session: drop the loading text and let the next
    /// resize apply unconditionally.
    pub fn reset(&mut self) {
        self.text.clear();
        self.loading = false;
        self.whole = false;
        self.applied_size = None;
        self.resize_due = None;
    }

    pub fn push_fragment(&mut self, fragment: &str, now: Instant) {
        if fragment.is_empty() {
            return;
        }
        self.loading = false;
        self.text.push_str(fragment);
        self.resize_due = Some(now + RESIZE_DEBOUNCE);
    }

    /// Replaces the content with a complete result and resizes right away.
    pub fn set_whole(&mut self, text: &str, now: Instant) {
        self.loading = false;
        self.whole = true;
        self.text = text.to_string();
        self.applied_size = None;
        self.resize_due = Some(now);
    }

    /// Returns the geometry to apply once the debounce deadline has passed and
    /// the size moved past the hysteresis band.
    pub fn take_due_geometry(&mut self, now: Instant) -> Option<PopupGeometry> {
        let due = self.resize_due?;
        if now < due {
            return None;
        }
        self.resize_due = None;
        let size = popup_size(&self.text, self.screen);
        if !needs_resize(self.applied_size, size) {
            return None;
        }
        self.applied_size = Some(size);
        Some(PopupGeometry {
            position: popup_position(self.anchor, size, self.screen),
            size,
        })
    }

    /// `None` means the platform has not reported focus yet; only an explicit
    /// focus counts before a blur can close the popup.
    pub fn observe_focus(&mut self, focused: Option<bool>, now: Instant) {
        match focused {
            Some(true) => {
                self.had_focus = true;
                self.blurred_at = None;
            }
            Some(false) if self.had_focus && self.blurred_at.is_none() => {
                self.blurred_at = Some(now);
            }
            _ => {}
        }
    }

    /// True once focus has stayed away for the re-check interval.
    pub fn should_close(&self, now: Instant) -> bool {
        self.blurred_at
            .is_some_and(|at| now.duration_since(at) >= FOCUS_RECHECK)
    }

    pub fn next_wakeup(&self) -> Option<Instant> {
        let blur = self.blurred_at.map(|at| at + FOCUS_RECHECK);
        match (self.resize_due, blur) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn copy_payload(&self) -> Option<&str> {
        if self.loading || self.text.trim().is_empty() {
            None
        } else {
            Some(&self.text)
        }
    }

    pub fn copy_to_clipboard(&mut self) {
        let notice = match self.copy_payload() {
            None => NOTHING_TO_COPY.to_string(),
            Some(text) => match notify::write_clipboard(text) {
                Ok(()) => "Copied to clipboard".to_string(),
                Err(e) => {
                    log::warn!("Clipboard write failed: {:#}", e);
                    format!("Copy failed: {}", e)
                }
            },
        };
        self.notice = Some(notice);
    }

    /// Draws the popup viewport. Returns false once it should be dropped.
    pub fn show(&mut self, ctx: &egui::Context, now: Instant) -> bool {
        let ppp = ctx.pixels_per_point();
        let builder = egui::ViewportBuilder::default()
            .with_title("Translation")
            .with_decorations(false)
            .with_transparent(true)
            .with_always_on_top()
            .with_taskbar(false)
            .with_position(self.initial.position / ppp)
            .with_inner_size(self.initial.size / ppp);
        let id = egui::ViewportId::from_hash_of(("translation_popup", self.session));

        let mut keep_open = true;
        ctx.show_viewport_immediate(id, builder, |ctx, _class| {
            if ctx.input(|i| i.viewport().close_requested()) {
                keep_open = false;
            }
            if !self.focus_requested {
                self.focus_requested = true;
                ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
            }
            let focused = ctx.input(|i| i.viewport().focused);
            self.observe_focus(focused, now);
            if self.should_close(now) {
                log::debug!("Popup {} lost focus; closing", self.session);
                keep_open = false;
            }
            if let Some(geometry) = self.take_due_geometry(now) {
                ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(geometry.size / ppp));
                ctx.send_viewport_cmd(egui::ViewportCommand::OuterPosition(geometry.position / ppp));
            }
            self.draw(ctx);
        });
        keep_open
    }

    fn draw(&mut self, ctx: &egui::Context) {
        let alpha = (self.opacity * 255.0).round() as u8;
        let fill = Color32::from_rgba_unmultiplied(32, 33, 36, alpha);
        let frame = egui::Frame::none().fill(fill).inner_margin(PADDING);

        egui::TopBottomPanel::bottom("popup_buttons")
            .frame(frame)
            .show_separator_line(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if let Some(notice) = &self.notice {
                        ui.label(notice.as_str());
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button(format!("{} Copy", icons::COPY)).clicked() {
                            self.copy_to_clipboard();
                        }
                    });
                });
            });

        egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(!self.whole)
                .show(ui, |ui| {
                    let mut view = self.text();
                    ui.add(
                        egui::TextEdit::multiline(&mut view)
                            .frame(false)
                            .desired_width(f32::INFINITY),
                    );
                });
        });
    }
}
