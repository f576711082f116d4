use crate::capture::Anchor;
use crate::hotkey::HotkeyAction;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    FullScreen,
    Region,
}

/// How a finished session's text reaches the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Fragments were already rendered; only the popup needs finalizing.
    Streamed,
    /// Nothing was rendered yet; insert header and the whole text at once.
    Whole(String),
}

/// Everything that crosses from background threads to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Hotkey(HotkeyAction),
    SessionStarted {
        session: SessionId,
        anchor: Anchor,
        kind: CaptureKind,
    },
    Fragment {
        session: SessionId,
        text: String,
        is_first: bool,
    },
    Finished {
        session: SessionId,
        completion: Completion,
    },
    CaptureCancelled,
    Status(String),
    ShowWindow,
    OpenSettings,
    ToggleMode,
    Quit,
}

impl UiEvent {
    /// Events the UI must act on right away, even from the taskbar. Session
    /// output and status lines can wait for the next frame.
    pub fn needs_frame(&self) -> bool {
        !matches!(
            self,
            UiEvent::Fragment { .. } | UiEvent::Finished { .. } | UiEvent::CaptureCancelled | UiEvent::Status(_)
        )
    }
}

/// Brings a minimized main window back without focusing it. Returns `true`
/// if the window was minimized.
pub type Waker = Arc<dyn Fn() -> bool + Send + Sync>;

/// Sending half of the UI queue. Every send requests a repaint. A minimized
/// window may never repaint, so events that need a frame also go through
/// the waker; the UI reads the `woken` flag to minimize again when idle.
#[derive(Clone)]
pub struct UiSender {
    tx: Sender<UiEvent>,
    ctx: Option<egui::Context>,
    waker: Option<Waker>,
    woken: Arc<AtomicBool>,
}

impl UiSender {
    pub fn send(&self, event: UiEvent) {
        // Flag first: the UI must see it no later than the event.
        if event.needs_frame() {
            if let Some(waker) = &self.waker {
                if waker() {
                    log::debug!("Main window restored to handle an event");
                    self.woken.store(true, Ordering::SeqCst);
                }
            }
        }
        if self.tx.send(event).is_err() {
            log::debug!("UI queue closed; event dropped");
            return;
        }
        if let Some(ctx) = &self.ctx {
            ctx.request_repaint();
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.send(UiEvent::Status(message.into()));
    }

    /// Attaches the egui context and the window waker once the event loop
    /// exists.
    pub fn with_context(&self, ctx: egui::Context, waker: Waker) -> Self {
        Self {
            ctx: Some(ctx),
            waker: Some(waker),
            ..self.clone()
        }
    }

    /// Whether the waker restored the window since the last call.
    pub fn take_woken(&self) -> bool {
        self.woken.swap(false, Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn with_waker(&self, waker: Waker) -> Self {
        Self {
            waker: Some(waker),
            ..self.clone()
        }
    }
}

pub fn ui_channel() -> (UiSender, Receiver<UiEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let sender = UiSender {
        tx,
        ctx: None,
        waker: None,
        woken: Arc::new(AtomicBool::new(false)),
    };
    (sender, rx)
}
