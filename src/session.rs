use crate::capture::{run_capture, Anchor, CaptureJob, ScreenGrabber};
use crate::config::{ImageDetail, Settings, TranslationMode};
use crate::events::{CaptureKind, Completion, SessionId, UiEvent, UiSender};
use crate::translate::{translate_image, TranslationRequest};
use std::sync::Arc;

/// Settings a worker needs, copied on the UI thread when the task starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub mode: TranslationMode,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub detail: ImageDetail,
    pub streaming: bool,
}

impl From<&Settings> for SessionSnapshot {
    fn from(s: &Settings) -> Self {
        Self {
            mode: s.translation_mode.clone(),
            api_key: s.api_key.clone(),
            base_url: s.base_url.clone(),
            model: s.model.clone(),
            detail: s.image_detail,
            streaming: s.streaming,
        }
    }
}

/// Worker-side state of one capture-to-render request.
pub struct TranslationSession {
    id: SessionId,
    anchor: Anchor,
    kind: CaptureKind,
    accumulated: String,
    first_seen: bool,
    sender: UiSender,
}

impl TranslationSession {
    pub fn start(id: SessionId, anchor: Anchor, kind: CaptureKind, sender: UiSender) -> Self {
        sender.send(UiEvent::SessionStarted {
            session: id,
            anchor,
            kind,
        });
        Self {
            id,
            anchor,
            kind,
            accumulated: String::new(),
            first_seen: false,
            sender,
        }
    }

    pub fn fragment(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let is_first = !self.first_seen;
        self.first_seen = true;
        self.accumulated.push_str(text);
        self.sender.send(UiEvent::Fragment {
            session: self.id,
            text: text.to_string(),
            is_first,
        });
    }

    /// Hands the final text to the UI. When nothing was streamed (streaming
    /// off, or the call failed before any output) the whole text is rendered
    /// in one go. A failure after partial output is appended on its own line.
    pub fn finish(mut self, final_text: String) {
        if self.first_seen && final_text != self.accumulated {
            self.fragment(&format!("\n{}", final_text));
        }
        let completion = if self.first_seen {
            Completion::Streamed
        } else {
            Completion::Whole(final_text)
        };
        log::info!(
            "Session {} finished ({:?} at {},{}; {} chars streamed)",
            self.id,
            self.kind,
            self.anchor.x,
            self.anchor.y,
            self.accumulated.chars().count()
        );
        self.sender.send(UiEvent::Finished {
            session: self.id,
            completion,
        });
    }
}

/// Captures, translates and reports one request. Never fails: capture
/// problems become a status message, translation problems become text.
pub async fn run_session(
    id: SessionId,
    job: CaptureJob,
    snapshot: SessionSnapshot,
    grabber: Arc<dyn ScreenGrabber>,
    sender: UiSender,
) {
    let shot = match run_capture(grabber.as_ref(), job).await {
        Ok(shot) => shot,
        Err(e) => {
            log::error!("Capture failed: {:#}", e);
            sender.status(format!("Capture failed: {:#}", e));
            return;
        }
    };

    log::info!(
        "Session {}: translating {}x{} capture with {} ({})",
        id,
        shot.image.width(),
        shot.image.height(),
        snapshot.model,
        snapshot.mode
    );
    sender.status("Analyzing image and translating...");
    let mut session = TranslationSession::start(id, shot.anchor, shot.kind, sender.clone());

    let request = TranslationRequest {
        image: &shot.image,
        mode: &snapshot.mode,
        api_key: &snapshot.api_key,
        base_url: &snapshot.base_url,
        model: &snapshot.model,
        detail: snapshot.detail,
        streaming: snapshot.streaming,
    };
    let result = translate_image(&request, |fragment| session.fragment(fragment)).await;
    session.finish(result);
    sender.status("Translation finished");
}

/// Fire-and-forget: the task is never joined or cancelled.
pub fn spawn_session(
    runtime: &tokio::runtime::Handle,
    id: SessionId,
    job: CaptureJob,
    snapshot: SessionSnapshot,
    grabber: Arc<dyn ScreenGrabber>,
    sender: UiSender,
) {
    runtime.spawn(run_session(id, job, snapshot, grabber, sender));
}
