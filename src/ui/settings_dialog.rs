use crate::config::{ImageDetail, Settings, SettingsForm, BASE_URL_PRESETS, MAX_OPACITY, MIN_OPACITY};
use crate::models;
use eframe::egui;

pub enum DialogOutcome {
    Open,
    Cancelled,
    Saved(Settings),
}

pub struct SettingsDialog {
    form: SettingsForm,
    picker: Vec<String>,
    error: Option<String>,
}

impl SettingsDialog {
    pub fn open(settings: &Settings) -> Self {
        Self {
            form: SettingsForm::from_settings(settings),
            picker: models::picker_entries(&settings.custom_models),
            error: None,
        }
    }

    /// Validates the form. On rejection the message is kept for display and
    /// nothing is returned.
    pub fn submit(&mut self, current: &Settings) -> Option<Settings> {
        match self.form.apply(current) {
            Ok(settings) => {
                self.error = None;
                Some(settings)
            }
            Err(e) => {
                log::info!("Settings rejected: {}", e);
                self.error = Some(e.to_string());
                None
            }
        }
    }

    pub fn show(&mut self, ctx: &egui::Context, current: &Settings) -> DialogOutcome {
        let mut outcome = DialogOutcome::Open;
        let mut window_open = true;
        egui::Window::new("Settings")
            .open(&mut window_open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                self.form_grid(ui);
                if let Some(error) = &self.error {
                    ui.colored_label(ui.visuals().error_fg_color, error.as_str());
                }
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        if let Some(settings) = self.submit(current) {
                            outcome = DialogOutcome::Saved(settings);
                        }
                    }
                    if ui.button("Cancel").clicked() {
                        outcome = DialogOutcome::Cancelled;
                    }
                    if ui.button("Reset API").clicked() {
                        self.form.reset_credentials();
                    }
                });
            });
        if !window_open {
            outcome = DialogOutcome::Cancelled;
        }
        outcome
    }

    fn form_grid(&mut self, ui: &mut egui::Ui) {
        let form = &mut self.form;
        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                ui.label("Full-screen hotkey");
                ui.text_edit_singleline(&mut form.fullscreen_hotkey);
                ui.end_row();

                ui.label("Region hotkey");
                ui.text_edit_singleline(&mut form.region_hotkey);
                ui.end_row();

                ui.label("Model");
                let mut choice = form.model_choice.clone();
                egui::ComboBox::from_id_source("model_picker")
                    .selected_text(choice.as_str())
                    .width(280.0)
                    .show_ui(ui, |ui| {
                        for entry in &self.picker {
                            ui.selectable_value(&mut choice, entry.clone(), entry.as_str());
                        }
                    });
                if choice != form.model_choice {
                    form.choose_model(&choice);
                }
                ui.end_row();

                let mut use_custom = form.use_custom_model;
                if ui.checkbox(&mut use_custom, "Custom model").changed() {
                    form.set_use_custom_model(use_custom);
                }
                ui.add_enabled(
                    form.use_custom_model,
                    egui::TextEdit::singleline(&mut form.custom_model).hint_text("vendor/model-name"),
                );
                ui.end_row();

                ui.label("Image detail");
                ui.horizontal(|ui| {
                    ui.radio_value(&mut form.image_detail, ImageDetail::High, "high");
                    ui.radio_value(&mut form.image_detail, ImageDetail::Low, "low");
                });
                ui.end_row();

                ui.label("Popup opacity");
                ui.add(egui::Slider::new(&mut form.popup_opacity, MIN_OPACITY..=MAX_OPACITY).fixed_decimals(2));
                ui.end_row();

                ui.label("Behaviour");
                ui.vertical(|ui| {
                    ui.checkbox(&mut form.auto_minimize, "Minimize on start");
                    ui.checkbox(&mut form.streaming, "Stream results");
                });
                ui.end_row();

                ui.label("API key");
                ui.add(egui::TextEdit::singleline(&mut form.api_key).password(true));
                ui.end_row();

                ui.label("Base URL");
                ui.horizontal(|ui| {
                    ui.text_edit_singleline(&mut form.base_url);
                    ui.menu_button("Presets", |ui| {
                        for preset in BASE_URL_PRESETS {
                            if ui.button(*preset).clicked() {
                                form.base_url = preset.to_string();
                                ui.close_menu();
                            }
                        }
                    });
                });
                ui.end_row();
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CUSTOM_MODEL_SENTINEL;

    #[test]
    fn picker_ends_with_custom_entry() {
        let dialog = SettingsDialog::open(&Settings::default());
        assert_eq!(dialog.picker.last().map(String::as_str), Some(CUSTOM_MODEL_SENTINEL));
    }

    #[test]
    fn rejected_submit_keeps_message_and_settings() {
        let current = Settings::default();
        let mut dialog = SettingsDialog::open(&current);
        assert!(dialog.submit(&current).is_none());
        assert_eq!(dialog.error.as_deref(), Some("API key cannot be empty"));

        dialog.form.api_key = "sk-live".into();
        let saved = dialog.submit(&current).expect("valid form saves");
        assert_eq!(saved.api_key, "sk-live");
        assert!(dialog.error.is_none());
        assert!(current.api_key.is_empty());
    }
}
