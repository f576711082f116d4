//! User-facing notifications outside the egui windows.

pub const APP_NAME: &str = "snaptrans";

pub fn toast(title: &str, body: &str) {
    #[cfg(windows)]
    {
        if let Err(e) = winrt_notification::Toast::new(winrt_notification::Toast::POWERSHELL_APP_ID)
            .title(title)
            .text1(body)
            .show()
        {
            log::warn!("Toast failed: {:?}", e);
        }
    }
    #[cfg(not(windows))]
    log::info!("{}: {}", title, body);
}

#[cfg(windows)]
fn wide(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

#[cfg(windows)]
pub fn message_box(title: &str, text: &str) {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging as wm;
    let text = wide(text);
    let title = wide(title);
    unsafe {
        let _ = wm::MessageBoxW(
            HWND(std::ptr::null_mut()),
            windows::core::PCWSTR(text.as_ptr()),
            windows::core::PCWSTR(title.as_ptr()),
            wm::MB_OK | wm::MB_ICONWARNING | wm::MB_TOPMOST | wm::MB_SETFOREGROUND,
        );
    }
}

/// Restores the top-level window titled `title` if it is minimized, without
/// activating it. Returns `true` if it was minimized.
#[cfg(windows)]
pub fn restore_without_focus(title: &str) -> bool {
    use windows::core::PCWSTR;
    use windows::Win32::UI::WindowsAndMessaging as wm;
    let title = wide(title);
    unsafe {
        let Ok(hwnd) = wm::FindWindowW(PCWSTR::null(), PCWSTR(title.as_ptr())) else {
            return false;
        };
        if hwnd.is_invalid() || !wm::IsIconic(hwnd).as_bool() {
            return false;
        }
        let _ = wm::ShowWindow(hwnd, wm::SW_SHOWNOACTIVATE);
        true
    }
}

#[cfg(not(windows))]
pub fn restore_without_focus(_title: &str) -> bool {
    false
}

#[cfg(not(windows))]
pub fn message_box(title: &str, text: &str) {
    log::warn!("{}: {}", title, text);
}

/// Shows a blocking warning box without stalling the caller's thread.
pub fn warn_async(title: &str, text: &str) {
    let (title, text) = (title.to_string(), text.to_string());
    std::thread::spawn(move || message_box(&title, &text));
}

pub fn write_clipboard(text: &str) -> anyhow::Result<()> {
    #[cfg(windows)]
    {
        clipboard_win::set_clipboard_string(text)
            .map_err(|e| anyhow::anyhow!("clipboard unavailable: {}", e))
    }
    #[cfg(not(windows))]
    {
        let _ = text;
        anyhow::bail!("clipboard is only supported on Windows")
    }
}
