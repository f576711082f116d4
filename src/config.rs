use crate::hotkey::{normalize_chord, Chord, ChordError, HotkeyBindings};
use crate::models::{self, CustomModelHistory, CUSTOM_MODEL_SENTINEL};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";
pub const BASE_URL_PRESETS: &[&str] = &["https://api.siliconflow.cn/v1", "https://openrouter.ai/api/v1"];

pub const MIN_OPACITY: f32 = 0.3;
pub const MAX_OPACITY: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TranslationMode {
    /// `zh-en`: translate whatever is on screen into English.
    ToEnglish,
    /// `en-zh`: colloquial Chinese that keeps the speaker's voice.
    ToChinese,
    /// Any other stored value; translated with a generic prompt.
    Other(String),
}

impl TranslationMode {
    pub fn as_str(&self) -> &str {
        match self {
            TranslationMode::ToEnglish => "zh-en",
            TranslationMode::ToChinese => "en-zh",
            TranslationMode::Other(s) => s,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            TranslationMode::ToEnglish => TranslationMode::ToChinese,
            _ => TranslationMode::ToEnglish,
        }
    }
}

impl From<String> for TranslationMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "zh-en" => TranslationMode::ToEnglish,
            "en-zh" => TranslationMode::ToChinese,
            _ => TranslationMode::Other(s),
        }
    }
}

impl From<TranslationMode> for String {
    fn from(mode: TranslationMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    High,
    Low,
}

impl ImageDetail {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageDetail::High => "high",
            ImageDetail::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "screenshot_hotkey")]
    pub fullscreen_hotkey: String,
    #[serde(rename = "area_screenshot_hotkey")]
    pub region_hotkey: String,
    pub translation_mode: TranslationMode,
    pub model: String,
    pub image_detail: ImageDetail,
    #[serde(rename = "result_opacity")]
    pub popup_opacity: f32,
    pub auto_minimize: bool,
    #[serde(rename = "use_streaming")]
    pub streaming: bool,
    pub api_key: String,
    pub base_url: String,
    pub custom_models: CustomModelHistory,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fullscreen_hotkey: "alt+shift+s".to_string(),
            region_hotkey: "f1".to_string(),
            translation_mode: TranslationMode::ToEnglish,
            model: models::default_model().to_string(),
            image_detail: ImageDetail::High,
            popup_opacity: 0.90,
            auto_minimize: true,
            streaming: true,
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            custom_models: CustomModelHistory::new(),
        }
    }
}

impl Settings {
    pub fn path() -> PathBuf {
        crate::logger::exe_dir().join("settings.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Missing fields take their defaults; an unreadable or malformed file
    /// yields the full defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut settings = match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str::<Settings>(&s).unwrap_or_else(|e| {
                log::warn!("settings.json is malformed ({}); using defaults", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        settings.popup_opacity = clamp_opacity(settings.popup_opacity);
        if !settings.custom_models.is_empty() {
            log::debug!("{} remembered custom models", settings.custom_models.len());
        }
        settings
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    /// Flips the translation mode and writes the file straight away. The
    /// flip stands even when the write fails.
    pub fn toggle_mode_and_save(&mut self, path: &Path) -> Result<()> {
        self.translation_mode = self.translation_mode.toggled();
        self.save_to(path)
    }

    /// Non-empty `SNAPTRANS_*` variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SNAPTRANS_API_KEY") {
            if !v.is_empty() {
                self.api_key = v;
            }
        }
        if let Ok(v) = std::env::var("SNAPTRANS_BASE_URL") {
            if !v.is_empty() {
                self.base_url = v;
            }
        }
        if let Ok(v) = std::env::var("SNAPTRANS_MODEL") {
            if !v.is_empty() {
                self.model = v;
            }
        }
    }

    pub fn hotkeys(&self) -> HotkeyBindings {
        HotkeyBindings {
            full_screen: self.fullscreen_hotkey.clone(),
            region: self.region_hotkey.clone(),
        }
    }
}

pub fn clamp_opacity(value: f32) -> f32 {
    if value.is_nan() {
        return Settings::default().popup_opacity;
    }
    value.clamp(MIN_OPACITY, MAX_OPACITY)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Custom model name cannot be empty")]
    EmptyCustomModel,
    #[error("Full-screen capture hotkey cannot be empty")]
    EmptyFullscreenHotkey,
    #[error("Region capture hotkey cannot be empty")]
    EmptyRegionHotkey,
    #[error("The two hotkeys cannot be the same")]
    DuplicateHotkeys,
    #[error("Invalid hotkey `{chord}`: {source}")]
    InvalidHotkey { chord: String, source: ChordError },
    #[error("API key cannot be empty")]
    EmptyApiKey,
    #[error("Base URL cannot be empty")]
    EmptyBaseUrl,
}

/// Editable copy of the settings backing the settings surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsForm {
    pub fullscreen_hotkey: String,
    pub region_hotkey: String,
    /// Picker value: a model identifier or [`CUSTOM_MODEL_SENTINEL`].
    pub model_choice: String,
    pub use_custom_model: bool,
    pub custom_model: String,
    pub image_detail: ImageDetail,
    pub popup_opacity: f32,
    pub auto_minimize: bool,
    pub streaming: bool,
    pub api_key: String,
    pub base_url: String,
}

impl SettingsForm {
    pub fn from_settings(settings: &Settings) -> Self {
        let (model_choice, use_custom_model, custom_model) =
            if models::is_custom_model(&settings.model, &settings.custom_models) {
                (CUSTOM_MODEL_SENTINEL.to_string(), true, settings.model.clone())
            } else {
                // Presets are the only non-custom models, so this is listed.
                (settings.model.clone(), false, String::new())
            };
        Self {
            fullscreen_hotkey: settings.fullscreen_hotkey.clone(),
            region_hotkey: settings.region_hotkey.clone(),
            model_choice,
            use_custom_model,
            custom_model,
            image_detail: settings.image_detail,
            popup_opacity: settings.popup_opacity,
            auto_minimize: settings.auto_minimize,
            streaming: settings.streaming,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
        }
    }

    /// Picking the sentinel turns on free-form entry; picking anything else
    /// turns it off.
    pub fn choose_model(&mut self, choice: &str) {
        self.model_choice = choice.to_string();
        self.use_custom_model = choice == CUSTOM_MODEL_SENTINEL;
    }

    pub fn set_use_custom_model(&mut self, on: bool) {
        self.use_custom_model = on;
        if on {
            self.model_choice = CUSTOM_MODEL_SENTINEL.to_string();
        } else if self.model_choice == CUSTOM_MODEL_SENTINEL {
            self.model_choice = models::default_model().to_string();
        }
    }

    pub fn reset_credentials(&mut self) {
        self.api_key.clear();
        self.base_url = DEFAULT_BASE_URL.to_string();
    }

    /// Validates the form and produces the new settings. `current` is left
    /// untouched; the caller swaps in the result.
    pub fn apply(&self, current: &Settings) -> Result<Settings, SettingsError> {
        let mut history = current.custom_models.clone();
        let model = if self.use_custom_model {
            let name = self.custom_model.trim();
            if name.is_empty() {
                return Err(SettingsError::EmptyCustomModel);
            }
            name.to_string()
        } else if self.model_choice == CUSTOM_MODEL_SENTINEL || self.model_choice.trim().is_empty() {
            models::default_model().to_string()
        } else {
            self.model_choice.clone()
        };

        let fullscreen_hotkey = self.fullscreen_hotkey.trim().to_string();
        let region_hotkey = self.region_hotkey.trim().to_string();
        if fullscreen_hotkey.is_empty() {
            return Err(SettingsError::EmptyFullscreenHotkey);
        }
        if region_hotkey.is_empty() {
            return Err(SettingsError::EmptyRegionHotkey);
        }
        if normalize_chord(&fullscreen_hotkey) == normalize_chord(&region_hotkey) {
            return Err(SettingsError::DuplicateHotkeys);
        }
        for chord in [&fullscreen_hotkey, &region_hotkey] {
            Chord::parse(chord).map_err(|source| SettingsError::InvalidHotkey {
                chord: chord.clone(),
                source,
            })?;
        }

        let api_key = self.api_key.trim().to_string();
        let base_url = self.base_url.trim().to_string();
        if api_key.is_empty() {
            return Err(SettingsError::EmptyApiKey);
        }
        if base_url.is_empty() {
            return Err(SettingsError::EmptyBaseUrl);
        }

        if self.use_custom_model {
            history.remember(&model);
        }

        Ok(Settings {
            fullscreen_hotkey,
            region_hotkey,
            translation_mode: current.translation_mode.clone(),
            model,
            image_detail: self.image_detail,
            popup_opacity: clamp_opacity(self.popup_opacity),
            auto_minimize: self.auto_minimize,
            streaming: self.streaming,
            api_key,
            base_url,
            custom_models: history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PRESET_MODELS;

    fn configured() -> Settings {
        Settings {
            api_key: "sk-test".into(),
            ..Settings::default()
        }
    }

    #[test]
    fn partial_file_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"api_key": "sk-1", "translation_mode": "en-zh"}"#).unwrap();

        let loaded = Settings::load_from(&path);
        let defaults = Settings::default();
        assert_eq!(loaded.api_key, "sk-1");
        assert_eq!(loaded.translation_mode, TranslationMode::ToChinese);
        assert_eq!(loaded.fullscreen_hotkey, "alt+shift+s");
        assert_eq!(loaded.region_hotkey, "f1");
        assert_eq!(loaded.image_detail, ImageDetail::High);
        assert_eq!(loaded.popup_opacity, defaults.popup_opacity);
        assert!(loaded.auto_minimize);
        assert!(loaded.streaming);
        assert_eq!(loaded.base_url, defaults.base_url);
        assert_eq!(loaded.model, defaults.model);
        assert!(loaded.custom_models.is_empty());
    }

    #[test]
    fn missing_or_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(Settings::load_from(&missing), Settings::default());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&broken), Settings::default());
    }

    #[test]
    fn saved_file_uses_the_documented_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        configured().save_to(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["screenshot_hotkey"], "alt+shift+s");
        assert_eq!(raw["area_screenshot_hotkey"], "f1");
        assert_eq!(raw["translation_mode"], "zh-en");
        assert_eq!(raw["image_detail"], "high");
        assert_eq!(raw["use_streaming"], true);
        assert!(raw["custom_models"].as_array().unwrap().is_empty());
        assert_eq!(Settings::load_from(&path), configured());
    }

    #[test]
    fn opacity_is_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"result_opacity": 0.05}"#).unwrap();
        assert_eq!(Settings::load_from(&path).popup_opacity, MIN_OPACITY);
    }

    #[test]
    fn unknown_mode_survives_and_toggles_back_to_english() {
        let mode: TranslationMode = serde_json::from_str(r#""ja-en""#).unwrap();
        assert_eq!(mode, TranslationMode::Other("ja-en".into()));
        assert_eq!(mode.toggled(), TranslationMode::ToEnglish);
        assert_eq!(TranslationMode::ToEnglish.toggled(), TranslationMode::ToChinese);
        assert_eq!(TranslationMode::ToChinese.toggled(), TranslationMode::ToEnglish);
    }

    #[test]
    fn toggling_the_mode_saves_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = configured();
        settings.toggle_mode_and_save(&path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["translation_mode"], "en-zh");
        assert_eq!(Settings::load_from(&path).translation_mode, TranslationMode::ToChinese);
    }

    #[test]
    fn failed_toggle_write_keeps_the_new_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = configured();
        // a directory cannot be written as a file
        assert!(settings.toggle_mode_and_save(dir.path()).is_err());
        assert_eq!(settings.translation_mode, TranslationMode::ToChinese);
    }

    #[test]
    fn equal_hotkeys_are_rejected() {
        let current = configured();
        let mut form = SettingsForm::from_settings(&current);
        form.region_hotkey = "Alt + Shift + S".into();
        assert_eq!(form.apply(&current), Err(SettingsError::DuplicateHotkeys));
    }

    #[test]
    fn malformed_hotkey_is_rejected() {
        let current = configured();
        let mut form = SettingsForm::from_settings(&current);
        form.region_hotkey = "ctrl+".into();
        assert!(matches!(
            form.apply(&current),
            Err(SettingsError::InvalidHotkey { .. })
        ));
    }

    #[test]
    fn custom_mode_without_name_is_rejected_without_mutation() {
        let current = configured();
        let before = current.clone();
        let mut form = SettingsForm::from_settings(&current);
        form.choose_model(CUSTOM_MODEL_SENTINEL);
        form.custom_model = "  ".into();
        let err = form.apply(&current).unwrap_err();
        assert_eq!(err.to_string(), "Custom model name cannot be empty");
        assert_eq!(current, before);
    }

    #[test]
    fn sentinel_without_custom_entry_falls_back_to_first_preset() {
        let current = configured();
        let mut form = SettingsForm::from_settings(&current);
        form.model_choice = CUSTOM_MODEL_SENTINEL.into();
        form.use_custom_model = false;
        assert_eq!(form.apply(&current).unwrap().model, PRESET_MODELS[0]);
    }

    #[test]
    fn empty_credentials_are_rejected_individually() {
        let current = configured();
        let mut form = SettingsForm::from_settings(&current);
        form.api_key = " ".into();
        assert_eq!(form.apply(&current), Err(SettingsError::EmptyApiKey));

        let mut form = SettingsForm::from_settings(&current);
        form.base_url.clear();
        assert_eq!(form.apply(&current), Err(SettingsError::EmptyBaseUrl));
    }

    #[test]
    fn new_custom_model_is_remembered() {
        let current = configured();
        let mut form = SettingsForm::from_settings(&current);
        form.set_use_custom_model(true);
        form.custom_model = "acme/vision-9b".into();
        let saved = form.apply(&current).unwrap();
        assert_eq!(saved.model, "acme/vision-9b");
        assert!(saved.custom_models.contains("acme/vision-9b"));

        let reopened = SettingsForm::from_settings(&saved);
        assert!(reopened.use_custom_model);
        assert_eq!(reopened.model_choice, CUSTOM_MODEL_SENTINEL);
        assert_eq!(reopened.custom_model, "acme/vision-9b");
    }

    #[test]
    fn reset_credentials_restores_defaults() {
        let mut form = SettingsForm::from_settings(&configured());
        form.base_url = "https://openrouter.ai/api/v1".into();
        form.reset_credentials();
        assert!(form.api_key.is_empty());
        assert_eq!(form.base_url, DEFAULT_BASE_URL);
    }
}
