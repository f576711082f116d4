use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Vision models offered out of the box, in picker order.
pub const PRESET_MODELS: &[&str] = &[
    "Qwen/Qwen2.5-VL-32B-Instruct",
    "Qwen/Qwen2.5-VL-72B-Instruct",
    "Pro/Qwen/Qwen2.5-VL-7B-Instruct",
    "Qwen/QVQ-72B-Preview",
    "deepseek-ai/deepseek-vl2",
    "moonshotai/kimi-vl-a3b-thinking:free",
    "google/gemma-3-4b-it:free",
    "qwen/qwen2.5-vl-32b-instruct:free",
    "qwen/qwen-2.5-vl-7b-instruct:free",
];

/// Picker entry that switches the settings surface to free-form model entry.
pub const CUSTOM_MODEL_SENTINEL: &str = "Custom model…";

pub const CUSTOM_HISTORY_CAPACITY: usize = 5;

pub fn default_model() -> &'static str {
    PRESET_MODELS[0]
}

pub fn is_preset(model: &str) -> bool {
    PRESET_MODELS.contains(&model)
}

/// Most-recently-used custom model names, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CustomModelHistory {
    entries: VecDeque<String>,
}

impl CustomModelHistory {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(CUSTOM_HISTORY_CAPACITY),
        }
    }

    /// Records a custom model. Presets, blanks and names already present are
    /// ignored. Returns whether the history changed.
    pub fn remember(&mut self, model: &str) -> bool {
        let model = model.trim();
        if model.is_empty() || is_preset(model) || self.contains(model) {
            return false;
        }
        if self.entries.len() == CUSTOM_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(model.to_string());
        true
    }

    pub fn contains(&self, model: &str) -> bool {
        self.entries.iter().any(|m| m == model)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<String>> for CustomModelHistory {
    fn from(list: Vec<String>) -> Self {
        let mut history = Self::new();
        for model in list {
            history.remember(&model);
        }
        history
    }
}

impl From<CustomModelHistory> for Vec<String> {
    fn from(history: CustomModelHistory) -> Self {
        history.entries.into_iter().collect()
    }
}

/// A model counts as custom when it is not a preset, or when the user has
/// typed it before (so it keeps showing as the custom entry when reopened).
pub fn is_custom_model(model: &str, history: &CustomModelHistory) -> bool {
    !is_preset(model) || history.contains(model)
}

/// Entries for the model picker: presets, remembered custom models, then the
/// sentinel.
pub fn picker_entries(history: &CustomModelHistory) -> Vec<String> {
    let mut all: Vec<String> = PRESET_MODELS.iter().map(|m| m.to_string()).collect();
    for model in history.iter() {
        if !all.iter().any(|m| m == model) {
            all.push(model.to_string());
        }
    }
    all.push(CUSTOM_MODEL_SENTINEL.to_string());
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixth_custom_model_evicts_the_oldest() {
        let mut history = CustomModelHistory::new();
        for name in ["m1", "m2", "m3", "m4", "m5", "m6"] {
            assert!(history.remember(name));
        }
        let kept: Vec<&str> = history.iter().collect();
        assert_eq!(kept, vec!["m2", "m3", "m4", "m5", "m6"]);
        assert_eq!(history.len(), CUSTOM_HISTORY_CAPACITY);
    }

    #[test]
    fn remember_skips_presets_and_duplicates() {
        let mut history = CustomModelHistory::new();
        assert!(!history.remember(PRESET_MODELS[1]));
        assert!(history.remember("my/vl-model"));
        assert!(!history.remember("my/vl-model"));
        assert!(!history.remember("   "));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn loading_an_oversized_list_keeps_the_newest_five() {
        let raw: Vec<String> = (1..=8).map(|i| format!("m{i}")).collect();
        let history = CustomModelHistory::from(raw);
        let kept: Vec<&str> = history.iter().collect();
        assert_eq!(kept, vec!["m4", "m5", "m6", "m7", "m8"]);
    }

    #[test]
    fn custom_detection() {
        let mut history = CustomModelHistory::new();
        assert!(!is_custom_model(PRESET_MODELS[0], &history));
        assert!(is_custom_model("someone/else", &history));
        history.remember("someone/else");
        assert!(is_custom_model("someone/else", &history));
    }

    #[test]
    fn picker_lists_history_before_sentinel() {
        let mut history = CustomModelHistory::new();
        history.remember("a/b");
        let entries = picker_entries(&history);
        assert_eq!(entries.len(), PRESET_MODELS.len() + 2);
        assert_eq!(entries[PRESET_MODELS.len()], "a/b");
        assert_eq!(entries.last().map(String::as_str), Some(CUSTOM_MODEL_SENTINEL));
    }

    #[test]
    fn history_serializes_as_plain_list() {
        let mut history = CustomModelHistory::new();
        history.remember("x/y");
        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(json, r#"["x/y"]"#);
    }
}
