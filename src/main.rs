#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

mod capture;
mod config;
mod events;
mod hotkey;
mod logger;
mod models;
mod notify;
mod session;
mod translate;
mod tray;
mod ui;

use notify::APP_NAME;

fn main() {
    logger::init();
    log::info!("App starting");

    #[cfg(windows)]
    unsafe {
        // Physical pixels everywhere: capture rectangles and popup geometry.
        use windows::Win32::UI::HiDpi::{SetProcessDpiAwareness, PROCESS_PER_MONITOR_DPI_AWARE};
        let _ = SetProcessDpiAwareness(PROCESS_PER_MONITOR_DPI_AWARE);
    }

    let mut settings = config::Settings::load();
    settings.apply_env_overrides();
    log::info!(
        "Settings loaded from {} (mode {}, model {}, streaming {})",
        config::Settings::path().display(),
        settings.translation_mode,
        settings.model,
        settings.streaming
    );

    if settings.api_key.is_empty() {
        notify::toast(APP_NAME, "No API key yet. Open Settings from the tray to add one.");
    } else {
        notify::toast(
            APP_NAME,
            &format!(
                "Ready. {} = full screen, {} = region.",
                settings.fullscreen_hotkey, settings.region_hotkey
            ),
        );
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("translate-worker")
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Could not start async runtime: {}", e);
            notify::message_box(APP_NAME, &format!("Could not start: {}", e));
            return;
        }
    };

    let (sender, events) = events::ui_channel();
    if let Err(e) = ui::run(settings, sender, events, runtime) {
        log::error!("{:#}", e);
        notify::message_box(APP_NAME, &format!("{:#}", e));
    }
    log::info!("App exiting");
}
