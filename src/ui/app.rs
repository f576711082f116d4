use super::fonts;
use super::log_pane::LogPane;
use super::overlay::{OverlayOutcome, RegionOverlay};
use super::popup::Popup;
use super::settings_dialog::{DialogOutcome, SettingsDialog};
use crate::capture::{Anchor, CaptureJob, ScreenGrabber, SystemGrabber};
use crate::config::{Settings, TranslationMode};
use crate::events::{CaptureKind, Completion, SessionId, UiEvent, UiSender};
use crate::hotkey::{HotkeyAction, HotkeyDispatcher};
use crate::notify::{self, APP_NAME};
use crate::session::{self, SessionSnapshot};
use crate::tray;
use chrono::Local;
use crossbeam_channel::Receiver;
use eframe::egui::{self, Vec2};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const AUTO_MINIMIZE_AFTER: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(120);
const FALLBACK_SCREEN: Vec2 = Vec2::new(1920.0, 1080.0);

pub fn mode_label(mode: &TranslationMode) -> String {
    match mode {
        TranslationMode::ToEnglish => "Any → English".to_string(),
        TranslationMode::ToChinese => "English → Chinese".to_string(),
        TranslationMode::Other(code) => format!("Custom ({})", code),
    }
}

/// A cancelled selection is reported and never reaches a worker.
fn job_for_outcome(outcome: OverlayOutcome, sender: &UiSender) -> Option<CaptureJob> {
    match outcome {
        OverlayOutcome::Committed(rect) => Some(CaptureJob::Region(rect)),
        OverlayOutcome::Cancelled => {
            sender.send(UiEvent::CaptureCancelled);
            None
        }
    }
}

/// Tracks a main window that was restored only so a hotkey, the overlay or
/// a popup could be served. It goes back to the taskbar once idle.
#[derive(Debug, Default)]
struct RootParking {
    pending: bool,
}

impl RootParking {
    fn woken(&mut self) {
        self.pending = true;
    }

    fn is_pending(&self) -> bool {
        self.pending
    }

    /// The user asked for the window, so it stays up.
    fn keep(&mut self) {
        self.pending = false;
    }

    /// True once, when the window should be minimized again.
    fn park_if_idle(&mut self, busy: bool) -> bool {
        let park = self.pending && !busy;
        if park {
            self.pending = false;
        }
        park
    }
}

/// Renders session output into the log and the popup. Lives on the UI
/// thread only.
#[derive(Default)]
pub struct Presenter {
    log: LogPane,
    popup: Option<Popup>,
    kinds: HashMap<SessionId, CaptureKind>,
}

impl Presenter {
    pub fn log(&self) -> &LogPane {
        &self.log
    }

    #[cfg(test)]
    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn has_popup(&self) -> bool {
        self.popup.is_some()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// A newer session takes over the popup.
    pub fn session_started(&mut self, session: SessionId, anchor: Anchor, kind: CaptureKind, screen: Vec2, opacity: f32) {
        self.kinds.insert(session, kind);
        self.popup = Some(Popup::new(session, anchor, screen, opacity));
    }

    pub fn fragment(&mut self, session: SessionId, text: &str, is_first: bool, now: Instant) {
        let kind = self.kind_of(session);
        let popup = self.popup.as_mut().filter(|p| p.session() == session);
        if is_first {
            self.log.begin_entry(kind, Local::now());
        }
        self.log.append(text);
        if let Some(popup) = popup {
            if is_first {
                popup.reset();
            }
            popup.push_fragment(text, now);
        }
    }

    pub fn finished(&mut self, session: SessionId, completion: Completion, now: Instant) {
        let kind = self.kind_of(session);
        self.kinds.remove(&session);
        if let Completion::Whole(text) = completion {
            self.log.append_whole(kind, Local::now(), &text);
            if let Some(popup) = self.popup.as_mut().filter(|p| p.session() == session) {
                popup.set_whole(&text, now);
            }
        }
    }

    fn kind_of(&self, session: SessionId) -> CaptureKind {
        self.kinds.get(&session).copied().unwrap_or(CaptureKind::FullScreen)
    }

    /// Draws the popup if one is open and drops it once it closes.
    pub fn show_popup(&mut self, ctx: &egui::Context, now: Instant) {
        if let Some(popup) = self.popup.as_mut() {
            let keep = popup.show(ctx, now);
            if let Some(at) = popup.next_wakeup() {
                ctx.request_repaint_after(at.saturating_duration_since(now));
            }
            if !keep {
                self.popup = None;
            }
        }
    }
}

pub struct TranslatorApp {
    settings: Settings,
    settings_path: PathBuf,
    events: Receiver<UiEvent>,
    sender: UiSender,
    runtime: tokio::runtime::Runtime,
    hotkeys: HotkeyDispatcher,
    grabber: Arc<dyn ScreenGrabber>,
    presenter: Presenter,
    overlay: Option<RegionOverlay>,
    settings_dialog: Option<SettingsDialog>,
    status: String,
    next_session: SessionId,
    started_at: Instant,
    auto_minimize_pending: bool,
    parking: RootParking,
}

impl TranslatorApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        settings: Settings,
        sender: UiSender,
        events: Receiver<UiEvent>,
        runtime: tokio::runtime::Runtime,
    ) -> Self {
        fonts::install(&cc.egui_ctx);
        let sender = sender.with_context(
            cc.egui_ctx.clone(),
            Arc::new(|| notify::restore_without_focus(APP_NAME)),
        );
        tray::spawn(sender.clone());

        let mut hotkeys = HotkeyDispatcher::new(sender.clone());
        let status = match hotkeys.register(&settings.hotkeys()) {
            Ok(()) => format!(
                "Ready. {} captures the screen, {} captures a region.",
                settings.fullscreen_hotkey, settings.region_hotkey
            ),
            Err(e) => {
                log::error!("Hotkey registration failed: {:#}", e);
                notify::warn_async(APP_NAME, &format!("Could not register hotkeys: {:#}", e));
                "Hotkeys inactive; fix them in Settings".to_string()
            }
        };

        Self {
            auto_minimize_pending: settings.auto_minimize,
            settings,
            settings_path: Settings::path(),
            events,
            sender,
            runtime,
            hotkeys,
            grabber: Arc::new(SystemGrabber::default()),
            presenter: Presenter::default(),
            overlay: None,
            settings_dialog: None,
            status,
            next_session: 1,
            started_at: Instant::now(),
            parking: RootParking::default(),
        }
    }

    /// Screen size in physical pixels.
    fn screen_size(&self, ctx: &egui::Context) -> Vec2 {
        if let Some((w, h)) = self.grabber.screen_size() {
            return Vec2::new(w as f32, h as f32);
        }
        let ppp = ctx.pixels_per_point();
        ctx.input(|i| i.viewport().monitor_size)
            .map(|size| size * ppp)
            .unwrap_or(FALLBACK_SCREEN)
    }

    fn start_session(&mut self, job: CaptureJob) {
        let id = self.next_session;
        self.next_session += 1;
        log::info!("Session {}: capture {:?}", id, job);
        session::spawn_session(
            self.runtime.handle(),
            id,
            job,
            SessionSnapshot::from(&self.settings),
            Arc::clone(&self.grabber),
            self.sender.clone(),
        );
    }

    fn handle_event(&mut self, ctx: &egui::Context, event: UiEvent) {
        let now = Instant::now();
        match event {
            UiEvent::Hotkey(HotkeyAction::CaptureFullScreen) => {
                self.status = "Capturing full screen...".into();
                let settle = self.parking.is_pending();
                self.start_session(CaptureJob::FullScreen { settle });
            }
            UiEvent::Hotkey(HotkeyAction::CaptureRegion) => {
                if self.overlay.is_none() {
                    log::info!("Region overlay opened");
                    self.status = "Drag to select a region, Esc to cancel".into();
                    self.overlay = Some(RegionOverlay::new(self.screen_size(ctx)));
                }
            }
            UiEvent::SessionStarted { session, anchor, kind } => {
                let screen = self.screen_size(ctx);
                self.presenter
                    .session_started(session, anchor, kind, screen, self.settings.popup_opacity);
            }
            UiEvent::Fragment { session, text, is_first } => {
                self.presenter.fragment(session, &text, is_first, now);
            }
            UiEvent::Finished { session, completion } => {
                self.presenter.finished(session, completion, now);
            }
            UiEvent::CaptureCancelled => {
                log::info!("Capture cancelled");
                self.status = "Capture cancelled".into();
            }
            UiEvent::Status(message) => self.status = message,
            UiEvent::ShowWindow => {
                self.parking.keep();
                show_main_window(ctx);
            }
            UiEvent::OpenSettings => {
                self.parking.keep();
                show_main_window(ctx);
                self.open_settings();
            }
            UiEvent::ToggleMode => self.toggle_mode(),
            UiEvent::Quit => {
                log::info!("Quit requested");
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        }
    }

    fn open_settings(&mut self) {
        if self.settings_dialog.is_none() {
            self.settings_dialog = Some(SettingsDialog::open(&self.settings));
        }
    }

    fn toggle_mode(&mut self) {
        let saved = self.settings.toggle_mode_and_save(&self.settings_path);
        log::info!("Translation mode switched to {}", self.settings.translation_mode);
        self.status = format!("Mode: {}", mode_label(&self.settings.translation_mode));
        if let Err(e) = saved {
            self.warn_unsaved(&e);
        }
    }

    /// Writes settings to disk; a failure only warns, the in-memory copy stays.
    fn persist_settings(&mut self) {
        if let Err(e) = self.settings.save_to(&self.settings_path) {
            self.warn_unsaved(&e);
        }
    }

    fn warn_unsaved(&mut self, e: &anyhow::Error) {
        log::warn!("Saving settings failed: {:#}", e);
        self.status = "Settings not saved to disk".into();
        notify::warn_async(APP_NAME, &format!("Could not write settings.json: {:#}", e));
    }

    fn apply_settings(&mut self, saved: Settings) {
        let chords_changed = saved.hotkeys() != self.settings.hotkeys();
        self.settings = saved;
        log::info!("Settings saved (model {})", self.settings.model);
        self.status = "Settings saved".into();
        self.persist_settings();
        if chords_changed {
            match self.hotkeys.reregister(&self.settings.hotkeys()) {
                Ok(()) => self.status = "Settings saved; hotkeys updated".into(),
                Err(e) => {
                    log::error!("Hotkey re-registration failed: {:#}", e);
                    self.status = "Hotkeys inactive; fix them in Settings".into();
                    notify::warn_async(APP_NAME, &format!("Could not register hotkeys: {:#}", e));
                }
            }
        }
    }

    fn show_overlay(&mut self, ctx: &egui::Context) {
        let Some(overlay) = self.overlay.as_mut() else { return };
        let Some(outcome) = overlay.show(ctx) else { return };
        self.overlay = None;
        if let Some(job) = job_for_outcome(outcome, &self.sender) {
            self.status = "Capturing region...".into();
            self.start_session(job);
        }
    }

    fn show_settings(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.settings_dialog.as_mut() else { return };
        match dialog.show(ctx, &self.settings) {
            DialogOutcome::Open => {}
            DialogOutcome::Cancelled => self.settings_dialog = None,
            DialogOutcome::Saved(saved) => {
                self.settings_dialog = None;
                self.apply_settings(saved);
            }
        }
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(APP_NAME);
                ui.label(format!(
                    "Full screen: {}   Region: {}",
                    self.settings.fullscreen_hotkey, self.settings.region_hotkey
                ));
                if !self.hotkeys.is_active() {
                    ui.colored_label(ui.visuals().warn_fg_color, "(hotkeys inactive)");
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Minimize").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(true));
                    }
                    let has_log = !self.presenter.log().is_empty();
                    if ui.add_enabled(has_log, egui::Button::new("Clear")).clicked() {
                        self.presenter.clear_log();
                        self.status = "Log cleared".into();
                    }
                    if ui.button("Settings").clicked() {
                        self.open_settings();
                    }
                    if ui.button(mode_label(&self.settings.translation_mode)).clicked() {
                        self.toggle_mode();
                    }
                });
            });
        });
    }
}

fn show_main_window(ctx: &egui::Context) {
    ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
    ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(false));
    ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
}

impl eframe::App for TranslatorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Poll even without input so queued events are never stranded.
        ctx.request_repaint_after(POLL_INTERVAL);

        while let Ok(event) = self.events.try_recv() {
            // The flag is set before the event is queued.
            if self.sender.take_woken() {
                self.parking.woken();
            }
            self.handle_event(ctx, event);
        }

        if self.auto_minimize_pending {
            let elapsed = self.started_at.elapsed();
            if elapsed >= AUTO_MINIMIZE_AFTER {
                self.auto_minimize_pending = false;
                ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(true));
            } else {
                ctx.request_repaint_after(AUTO_MINIMIZE_AFTER - elapsed);
            }
        }

        self.show_overlay(ctx);
        self.presenter.show_popup(ctx, Instant::now());

        let busy = self.overlay.is_some() || self.presenter.has_popup() || self.settings_dialog.is_some();
        if self.parking.park_if_idle(busy) {
            log::debug!("Main window back to the taskbar");
            ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(true));
        }

        self.top_bar(ctx);
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(self.status.as_str());
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            self.presenter.log().show(ui);
        });
        self.show_settings(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ScreenRect;
    use crate::events::ui_channel;
    use crate::ui::overlay::OverlayInput;

    const SCREEN: Vec2 = Vec2::new(1920.0, 1080.0);

    #[test]
    fn streamed_session_renders_header_once() {
        let now = Instant::now();
        let mut p = Presenter::default();
        p.session_started(1, Anchor { x: 5, y: 5 }, CaptureKind::Region, SCREEN, 0.9);
        assert!(p.popup().unwrap().is_loading());

        p.fragment(1, "Hel", true, now);
        p.fragment(1, "lo, ", false, now);
        p.fragment(1, "world", false, now);
        p.finished(1, Completion::Streamed, now);

        let log = p.log().text();
        assert!(log.starts_with("--- "));
        assert!(log.ends_with(" (region capture) ---\nHello, world"));
        assert_eq!(log.matches("---\n").count(), 1);
        assert_eq!(p.popup().unwrap().text(), "Hello, world");
    }

    #[test]
    fn whole_result_replaces_loading_text() {
        let now = Instant::now();
        let mut p = Presenter::default();
        p.session_started(2, Anchor::default(), CaptureKind::FullScreen, SCREEN, 0.9);
        p.finished(2, Completion::Whole("Translation failed: boom".into()), now);

        assert!(p.log().text().ends_with(" ---\nTranslation failed: boom\n\n"));
        assert!(!p.log().text().contains("region capture"));
        let popup = p.popup().unwrap();
        assert!(!popup.is_loading());
        assert_eq!(popup.text(), "Translation failed: boom");
    }

    #[test]
    fn older_session_output_only_reaches_the_log() {
        let now = Instant::now();
        let mut p = Presenter::default();
        p.session_started(1, Anchor::default(), CaptureKind::FullScreen, SCREEN, 0.9);
        p.session_started(2, Anchor::default(), CaptureKind::FullScreen, SCREEN, 0.9);
        p.fragment(1, "old", true, now);

        assert!(p.log().text().ends_with("old"));
        assert_eq!(p.popup().unwrap().session(), 2);
        assert!(p.popup().unwrap().is_loading());
    }

    #[test]
    fn cancelled_selection_starts_no_session() {
        let (sender, rx) = ui_channel();
        let mut overlay = RegionOverlay::new(SCREEN);
        overlay.feed(OverlayInput { pointer: Some((100, 100)), pressed: true, down: true, ..Default::default() });
        overlay.feed(OverlayInput { pointer: Some((105, 150)), released: true, ..Default::default() });

        let outcome = overlay.outcome().unwrap();
        assert_eq!(job_for_outcome(outcome, &sender), None);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![UiEvent::CaptureCancelled]);

        let mut overlay = RegionOverlay::new(SCREEN);
        overlay.feed(OverlayInput { cancel: true, ..Default::default() });
        assert_eq!(job_for_outcome(overlay.outcome().unwrap(), &sender), None);
        assert_eq!(rx.try_recv(), Ok(UiEvent::CaptureCancelled));
    }

    #[test]
    fn committed_selection_becomes_a_region_job() {
        let (sender, rx) = ui_channel();
        let rect = ScreenRect::from_corners((10, 10), (300, 200));
        assert_eq!(
            job_for_outcome(OverlayOutcome::Committed(rect), &sender),
            Some(CaptureJob::Region(rect))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn woken_window_parks_once_idle() {
        let mut parking = RootParking::default();
        assert!(!parking.park_if_idle(false), "never woken");

        parking.woken();
        assert!(parking.is_pending());
        assert!(!parking.park_if_idle(true), "overlay or popup still open");
        assert!(parking.park_if_idle(false));
        assert!(!parking.park_if_idle(false), "parks only once");

        parking.woken();
        parking.keep();
        assert!(!parking.park_if_idle(false), "user asked for the window");
    }

    #[test]
    fn popup_keeps_a_woken_window_up_until_it_closes() {
        let now = Instant::now();
        let mut p = Presenter::default();
        let mut parking = RootParking::default();
        parking.woken();
        p.session_started(1, Anchor::default(), CaptureKind::FullScreen, SCREEN, 0.9);
        p.fragment(1, "hi", true, now);
        assert!(!parking.park_if_idle(p.has_popup()));

        p.popup = None;
        assert!(parking.park_if_idle(p.has_popup()));
        assert!(p.log().text().ends_with("hi"));
    }

    #[test]
    fn mode_labels() {
        assert_eq!(mode_label(&TranslationMode::ToEnglish), "Any → English");
        assert_eq!(mode_label(&TranslationMode::Other("ja-en".into())), "Custom (ja-en)");
    }
}
