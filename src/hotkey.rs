use crate::events::UiSender;
use anyhow::{bail, Context as _};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Pause between tearing down the old listener and registering new chords.
pub const REREGISTER_SETTLE: Duration = Duration::from_millis(200);

pub const MOD_ALT: u32 = 0x0001;
pub const MOD_CONTROL: u32 = 0x0002;
pub const MOD_SHIFT: u32 = 0x0004;
pub const MOD_WIN: u32 = 0x0008;

const FULL_SCREEN_ID: i32 = 1;
const REGION_ID: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    CaptureFullScreen,
    CaptureRegion,
}

impl HotkeyAction {
    #[cfg_attr(not(windows), allow(dead_code))]
    fn id(self) -> i32 {
        match self {
            HotkeyAction::CaptureFullScreen => FULL_SCREEN_ID,
            HotkeyAction::CaptureRegion => REGION_ID,
        }
    }

    #[cfg_attr(not(windows), allow(dead_code))]
    fn from_id(id: i32) -> Option<Self> {
        match id {
            FULL_SCREEN_ID => Some(HotkeyAction::CaptureFullScreen),
            REGION_ID => Some(HotkeyAction::CaptureRegion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChordError {
    #[error("hotkey is empty")]
    Empty,
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("hotkey `{0}` has no key, only modifiers")]
    MissingKey(String),
    #[error("hotkey `{0}` has more than one non-modifier key")]
    MultipleKeys(String),
}

/// A parsed key chord: Win32 `MOD_*` flags plus a virtual-key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub modifiers: u32,
    pub vk: u32,
}

impl Chord {
    /// Parses chords written like `alt+shift+s`, `ctrl+f2` or `f1`.
    pub fn parse(text: &str) -> Result<Self, ChordError> {
        let normalized = normalize_chord(text);
        if normalized.is_empty() {
            return Err(ChordError::Empty);
        }
        let mut modifiers = 0;
        let mut vk = None;
        for token in normalized.split('+') {
            match token {
                "ctrl" | "control" => modifiers |= MOD_CONTROL,
                "alt" => modifiers |= MOD_ALT,
                "shift" => modifiers |= MOD_SHIFT,
                "win" | "windows" | "super" | "cmd" => modifiers |= MOD_WIN,
                key => {
                    let code =
                        key_code(key).ok_or_else(|| ChordError::UnknownKey(key.to_string()))?;
                    if vk.replace(code).is_some() {
                        return Err(ChordError::MultipleKeys(normalized.clone()));
                    }
                }
            }
        }
        match vk {
            Some(vk) => Ok(Chord { modifiers, vk }),
            None => Err(ChordError::MissingKey(normalized)),
        }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in [
            (MOD_CONTROL, "ctrl+"),
            (MOD_ALT, "alt+"),
            (MOD_SHIFT, "shift+"),
            (MOD_WIN, "win+"),
        ] {
            if self.modifiers & flag != 0 {
                f.write_str(name)?;
            }
        }
        match key_name(self.vk) {
            Some(name) => f.write_str(&name),
            None => write!(f, "vk{:#04x}", self.vk),
        }
    }
}

/// Lowercases and drops whitespace so `Alt + S` and `alt+s` compare equal.
pub fn normalize_chord(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn key_code(key: &str) -> Option<u32> {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return match c {
            'a'..='z' => Some(0x41 + (c as u32 - 'a' as u32)),
            '0'..='9' => Some(0x30 + (c as u32 - '0' as u32)),
            _ => None,
        };
    }
    if let Some(n) = key.strip_prefix('f').and_then(|n| n.parse::<u32>().ok()) {
        return (1..=24).contains(&n).then_some(0x70 + n - 1);
    }
    NAMED_KEYS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|&(_, code)| code)
}

/// Inverse of `key_code`, giving the first spelling listed for a key.
fn key_name(vk: u32) -> Option<String> {
    match vk {
        0x30..=0x39 | 0x41..=0x5A => char::from_u32(vk).map(|c| c.to_ascii_lowercase().to_string()),
        0x70..=0x87 => Some(format!("f{}", vk - 0x6F)),
        _ => NAMED_KEYS
            .iter()
            .find(|&&(_, code)| code == vk)
            .map(|(name, _)| name.to_string()),
    }
}

const NAMED_KEYS: &[(&str, u32)] = &[
    ("space", 0x20),
    ("tab", 0x09),
    ("enter", 0x0D),
    ("return", 0x0D),
    ("esc", 0x1B),
    ("escape", 0x1B),
    ("backspace", 0x08),
    ("insert", 0x2D),
    ("ins", 0x2D),
    ("delete", 0x2E),
    ("del", 0x2E),
    ("home", 0x24),
    ("end", 0x23),
    ("pageup", 0x21),
    ("pgup", 0x21),
    ("pagedown", 0x22),
    ("pgdn", 0x22),
    ("left", 0x25),
    ("up", 0x26),
    ("right", 0x27),
    ("down", 0x28),
    ("printscreen", 0x2C),
    ("print_screen", 0x2C),
    ("pause", 0x13),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBindings {
    pub full_screen: String,
    pub region: String,
}

impl HotkeyBindings {
    fn parse(&self) -> anyhow::Result<[(HotkeyAction, Chord); 2]> {
        let full = Chord::parse(&self.full_screen)
            .with_context(|| format!("full-screen hotkey `{}`", self.full_screen))?;
        let region = Chord::parse(&self.region)
            .with_context(|| format!("region hotkey `{}`", self.region))?;
        if full == region {
            bail!("full-screen and region hotkeys are the same");
        }
        Ok([
            (HotkeyAction::CaptureFullScreen, full),
            (HotkeyAction::CaptureRegion, region),
        ])
    }
}

/// Owns the background listener thread that turns global chords into
/// `UiEvent::Hotkey` messages.
pub struct HotkeyDispatcher {
    sender: UiSender,
    listener: Option<platform::Listener>,
}

impl HotkeyDispatcher {
    pub fn new(sender: UiSender) -> Self {
        Self {
            sender,
            listener: None,
        }
    }

    /// Drops any previous bindings, then binds both chords. On failure no
    /// hotkey stays active.
    pub fn register(&mut self, bindings: &HotkeyBindings) -> anyhow::Result<()> {
        self.unhook();
        let chords = bindings.parse()?;
        let listener = platform::spawn(chords, self.sender.clone())?;
        log::info!(
            "Hotkeys registered: full screen `{}`, region `{}`",
            bindings.full_screen,
            bindings.region
        );
        self.listener = Some(listener);
        Ok(())
    }

    pub fn unhook(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
            log::info!("Hotkeys unhooked");
        }
    }

    /// Full unhook, a short settle, then registration of the new chords.
    pub fn reregister(&mut self, bindings: &HotkeyBindings) -> anyhow::Result<()> {
        self.unhook();
        thread::sleep(REREGISTER_SETTLE);
        self.register(bindings)
    }

    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }
}

impl Drop for HotkeyDispatcher {
    fn drop(&mut self) {
        self.unhook();
    }
}

#[cfg(windows)]
mod platform {
    use super::{Chord, HotkeyAction};
    use crate::events::{UiEvent, UiSender};
    use anyhow::anyhow;
    use std::thread::{self, JoinHandle};
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse as km;
    use windows::Win32::UI::WindowsAndMessaging as wm;

    pub struct Listener {
        thread_id: u32,
        join: JoinHandle<()>,
    }

    fn null_hwnd() -> HWND {
        HWND(std::ptr::null_mut())
    }

    unsafe fn unregister(actions: &[HotkeyAction]) {
        for action in actions {
            let _ = km::UnregisterHotKey(null_hwnd(), action.id());
        }
    }

    pub fn spawn(chords: [(HotkeyAction, Chord); 2], sender: UiSender) -> anyhow::Result<Listener> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32, String>>(1);
        let join = thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || unsafe {
                let mut msg = wm::MSG::default();
                // Forces the thread message queue into existence so a stop
                // request posted right after registration is not lost.
                let _ = wm::PeekMessageW(&mut msg, null_hwnd(), wm::WM_USER, wm::WM_USER, wm::PM_NOREMOVE);

                let mut registered = Vec::new();
                for (action, chord) in chords {
                    let modifiers = km::HOT_KEY_MODIFIERS(chord.modifiers | km::MOD_NOREPEAT.0);
                    if km::RegisterHotKey(null_hwnd(), action.id(), modifiers, chord.vk).is_err() {
                        unregister(&registered);
                        let _ = ready_tx.send(Err(format!(
                            "RegisterHotKey failed for {chord} (already in use?)"
                        )));
                        return;
                    }
                    registered.push(action);
                }
                let _ = ready_tx.send(Ok(GetCurrentThreadId()));

                loop {
                    let got = wm::GetMessageW(&mut msg, null_hwnd(), 0, 0);
                    if got.0 == 0 || got.0 == -1 {
                        break;
                    }
                    if msg.message == wm::WM_HOTKEY {
                        if let Some(action) = HotkeyAction::from_id(msg.wParam.0 as i32) {
                            log::info!("WM_HOTKEY received: {:?}", action);
                            sender.send(UiEvent::Hotkey(action));
                        }
                    }
                    let _ = wm::TranslateMessage(&msg);
                    wm::DispatchMessageW(&msg);
                }
                unregister(&registered);
            })?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => Ok(Listener { thread_id, join }),
            Ok(Err(message)) => {
                let _ = join.join();
                Err(anyhow!(message))
            }
            Err(_) => {
                let _ = join.join();
                Err(anyhow!("hotkey listener exited before registering"))
            }
        }
    }

    impl Listener {
        pub fn stop(self) {
            unsafe {
                let _ = wm::PostThreadMessageW(self.thread_id, wm::WM_QUIT, WPARAM(0), LPARAM(0));
            }
            let _ = self.join.join();
        }
    }
}

#[cfg(not(windows))]
mod platform {
    use super::{Chord, HotkeyAction};
    use crate::events::UiSender;
    use crossbeam_channel::Sender;
    use std::thread::{self, JoinHandle};

    /// Global hotkeys are Windows-only; elsewhere the listener just parks until
    /// unhooked so the dispatcher lifecycle stays the same.
    pub struct Listener {
        stop_tx: Sender<()>,
        join: JoinHandle<()>,
    }

    pub fn spawn(_chords: [(HotkeyAction, Chord); 2], _sender: UiSender) -> anyhow::Result<Listener> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let join = thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                log::warn!("Global hotkeys are not supported on this platform");
                let _ = stop_rx.recv();
            })?;
        Ok(Listener { stop_tx, join })
    }

    impl Listener {
        pub fn stop(self) {
            let _ = self.stop_tx.send(());
            let _ = self.join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ui_channel;

    #[test]
    fn parses_default_chords() {
        let full = Chord::parse("alt+shift+s").unwrap();
        assert_eq!(full.modifiers, MOD_ALT | MOD_SHIFT);
        assert_eq!(full.vk, 0x53);

        let region = Chord::parse("f1").unwrap();
        assert_eq!(region.modifiers, 0);
        assert_eq!(region.vk, 0x70);
    }

    #[test]
    fn parsing_ignores_case_and_spaces() {
        assert_eq!(
            Chord::parse(" Ctrl + Shift + A ").unwrap(),
            Chord::parse("ctrl+shift+a").unwrap()
        );
    }

    #[test]
    fn rejects_malformed_chords() {
        assert_eq!(Chord::parse("  "), Err(ChordError::Empty));
        assert_eq!(
            Chord::parse("ctrl+alt"),
            Err(ChordError::MissingKey("ctrl+alt".into()))
        );
        assert_eq!(
            Chord::parse("ctrl+a+b"),
            Err(ChordError::MultipleKeys("ctrl+a+b".into()))
        );
        assert_eq!(
            Chord::parse("ctrl+banana"),
            Err(ChordError::UnknownKey("banana".into()))
        );
        assert!(Chord::parse("f25").is_err());
    }

    #[test]
    fn chords_display_as_typed() {
        for text in ["alt+shift+s", "f1", "ctrl+space", "win+f12", "ctrl+alt+9", "shift+pageup"] {
            assert_eq!(Chord::parse(text).unwrap().to_string(), text);
        }
        assert_eq!(Chord::parse("Shift + Ctrl + Escape").unwrap().to_string(), "ctrl+shift+esc");
        let unnamed = Chord { modifiers: MOD_ALT, vk: 0xBA };
        assert_eq!(unnamed.to_string(), "alt+vk0xba");
    }

    #[test]
    fn register_failure_leaves_dispatcher_inactive() {
        let (sender, _rx) = ui_channel();
        let mut dispatcher = HotkeyDispatcher::new(sender);
        let bindings = HotkeyBindings {
            full_screen: "ctrl+nope".into(),
            region: "f1".into(),
        };
        assert!(dispatcher.register(&bindings).is_err());
        assert!(!dispatcher.is_active());
    }

    #[test]
    fn equal_chords_are_not_registered() {
        let (sender, _rx) = ui_channel();
        let mut dispatcher = HotkeyDispatcher::new(sender);
        let bindings = HotkeyBindings {
            full_screen: "Alt+Shift+S".into(),
            region: "alt+shift+s".into(),
        };
        assert!(dispatcher.register(&bindings).is_err());
        assert!(!dispatcher.is_active());
    }

    #[cfg(not(windows))]
    #[test]
    fn reregister_replaces_the_listener() {
        let (sender, _rx) = ui_channel();
        let mut dispatcher = HotkeyDispatcher::new(sender);
        let first = HotkeyBindings {
            full_screen: "alt+shift+s".into(),
            region: "f1".into(),
        };
        dispatcher.register(&first).unwrap();
        assert!(dispatcher.is_active());

        let second = HotkeyBindings {
            full_screen: "ctrl+f2".into(),
            region: "ctrl+f3".into(),
        };
        dispatcher.reregister(&second).unwrap();
        assert!(dispatcher.is_active());

        dispatcher.unhook();
        assert!(!dispatcher.is_active());
    }
}
