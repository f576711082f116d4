mod app;
mod fonts;
mod log_pane;
mod overlay;
mod popup;
mod settings_dialog;

pub use app::TranslatorApp;

use crate::config::Settings;
use crate::events::{UiEvent, UiSender};
use crossbeam_channel::Receiver;
use eframe::egui;

/// Runs the egui event loop on the calling (main) thread until the window
/// closes.
pub fn run(
    settings: Settings,
    sender: UiSender,
    events: Receiver<UiEvent>,
    runtime: tokio::runtime::Runtime,
) -> anyhow::Result<()> {
    log::info!("Main UI: starting event loop");
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(crate::notify::APP_NAME)
            .with_inner_size([720.0, 520.0])
            .with_min_inner_size([480.0, 320.0]),
        ..Default::default()
    };
    eframe::run_native(
        crate::notify::APP_NAME,
        native_options,
        Box::new(move |cc| Box::new(TranslatorApp::new(cc, settings, sender, events, runtime))),
    )
    .map_err(|e| anyhow::anyhow!("UI event loop failed: {}", e))?;
    log::info!("Main UI: event loop exited");
    Ok(())
}
