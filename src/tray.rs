use crate::events::{UiEvent, UiSender};
use crossbeam_channel::Receiver;
use std::thread;
use std::time::Duration;
use tray_icon as tri;
use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

const PUMP_INTERVAL: Duration = Duration::from_millis(25);

pub struct TrayHandle {
    _tray: TrayIcon,
    menu_event_rx: Receiver<MenuEvent>,
    tray_event_rx: Receiver<tri::TrayIconEvent>,
    show_item: MenuItem,
    settings_item: MenuItem,
    toggle_item: MenuItem,
    quit_item: MenuItem,
    sender: UiSender,
}

fn tray_icon_image() -> anyhow::Result<Icon> {
    // 16x16 amber square with a dark border
    let side = 16usize;
    let mut rgba = Vec::with_capacity(side * side * 4);
    for y in 0..side {
        for x in 0..side {
            let edge = x == 0 || y == 0 || x == side - 1 || y == side - 1;
            let px = if edge { [0x33, 0x2B, 0x1F, 0xFF] } else { [0xF5, 0xA6, 0x23, 0xFF] };
            rgba.extend_from_slice(&px);
        }
    }
    Ok(Icon::from_rgba(rgba, side as u32, side as u32)?)
}

impl TrayHandle {
    pub fn new(sender: UiSender) -> anyhow::Result<Self> {
        let menu = Menu::new();
        let show = MenuItem::new("Show window", true, None);
        let settings = MenuItem::new("Settings...", true, None);
        let toggle = MenuItem::new("Toggle mode", true, None);
        let quit = MenuItem::new("Quit", true, None);
        let sep = PredefinedMenuItem::separator();
        menu.append_items(&[&show, &settings, &toggle, &sep, &quit])?;

        let tray = TrayIconBuilder::new()
            .with_tooltip(crate::notify::APP_NAME)
            .with_menu(Box::new(menu))
            .with_icon(tray_icon_image()?)
            .build()?;

        Ok(Self {
            _tray: tray,
            menu_event_rx: MenuEvent::receiver().clone(),
            tray_event_rx: tri::TrayIconEvent::receiver().clone(),
            show_item: show,
            settings_item: settings,
            toggle_item: toggle,
            quit_item: quit,
            sender,
        })
    }

    fn menu_action(&self, id: &tri::menu::MenuId) -> Option<UiEvent> {
        if id == self.show_item.id() {
            Some(UiEvent::ShowWindow)
        } else if id == self.settings_item.id() {
            Some(UiEvent::OpenSettings)
        } else if id == self.toggle_item.id() {
            Some(UiEvent::ToggleMode)
        } else if id == self.quit_item.id() {
            Some(UiEvent::Quit)
        } else {
            None
        }
    }

    /// Non-blocking poll of menu and icon clicks.
    pub fn pump(&self) {
        while let Ok(event) = self.menu_event_rx.try_recv() {
            if let Some(action) = self.menu_action(&event.id) {
                log::info!("Tray: {:?}", action);
                self.sender.send(action);
            }
        }
        while let Ok(event) = self.tray_event_rx.try_recv() {
            if matches!(event.click_type, tri::ClickType::Left | tri::ClickType::Double) {
                log::debug!("Tray: icon clicked, showing window");
                self.sender.send(UiEvent::ShowWindow);
            }
        }
    }
}

/// Owns the tray icon on its own thread; tray types are not `Send`.
pub fn spawn(sender: UiSender) {
    let spawned = thread::Builder::new()
        .name("tray".into())
        .spawn(move || match TrayHandle::new(sender) {
            Ok(tray) => {
                log::info!("Tray created");
                loop {
                    #[cfg(windows)]
                    pump_thread_messages();
                    tray.pump();
                    thread::sleep(PUMP_INTERVAL);
                }
            }
            Err(e) => {
                log::error!("Tray failed: {:#}", e);
                crate::notify::toast(crate::notify::APP_NAME, &format!("Tray failed: {}", e));
            }
        });
    if let Err(e) = spawned {
        log::error!("Could not start tray thread: {}", e);
    }
}

#[cfg(windows)]
fn pump_thread_messages() {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging as wm;
    unsafe {
        let mut msg = wm::MSG::default();
        while wm::PeekMessageW(&mut msg, HWND(std::ptr::null_mut()), 0, 0, wm::PM_REMOVE).into() {
            let _ = wm::TranslateMessage(&msg);
            wm::DispatchMessageW(&msg);
        }
    }
}
