use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;
use crate::task::{Task, TaskId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(StoreError::InvalidArgument(format!("unknown theme: {other}"))),
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl From<Option<String>> for Theme {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref()
            .and_then(|value| Self::parse(value).ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// View filter applied after the search term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKey {
    #[default]
    All,
    Active,
    Completed,
    Overdue,
    HighPriority,
    Today,
}

impl FilterKey {
    pub const ALL: [FilterKey; 6] = [
        FilterKey::All,
        FilterKey::Active,
        FilterKey::Completed,
        FilterKey::Overdue,
        FilterKey::HighPriority,
        FilterKey::Today,
    ];

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == raw.trim())
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown filter: {}", raw.trim())))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
            Self::HighPriority => "high-priority",
            Self::Today => "today",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub animations: bool,
    pub sound_effects: bool,
    pub auto_save: bool,
    pub show_completed_count: bool,
    pub compact_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            animations: true,
            sound_effects: false,
            auto_save: true,
            show_completed_count: true,
            compact_mode: false,
        }
    }
}

impl Settings {
    pub const KEYS: [&'static str; 5] = [
        "animations",
        "soundEffects",
        "autoSave",
        "showCompletedCount",
        "compactMode",
    ];

    pub fn merged(mut self, patch: SettingsPatch) -> Self {
        if let Some(value) = patch.animations {
            self.animations = value;
        }
        if let Some(value) = patch.sound_effects {
            self.sound_effects = value;
        }
        if let Some(value) = patch.auto_save {
            self.auto_save = value;
        }
        if let Some(value) = patch.show_completed_count {
            self.show_completed_count = value;
        }
        if let Some(value) = patch.compact_mode {
            self.compact_mode = value;
        }
        self
    }

    pub fn entries(&self) -> [(&'static str, bool); 5] {
        let mut copy = *self;
        Self::KEYS.map(|key| (key, copy.slot_mut(key).is_some_and(|flag| *flag)))
    }

    /// Reads a stored settings object key by key. Missing or non-boolean
    /// values keep their defaults.
    pub fn from_stored(value: &Value) -> Self {
        let mut settings = Self::default();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                warn!(value = %value, "stored settings are not an object; using defaults");
            }
            return settings;
        };

        for key in Self::KEYS {
            match map.get(key) {
                None | Some(Value::Null) => {}
                Some(Value::Bool(flag)) => {
                    if let Some(slot) = settings.slot_mut(key) {
                        *slot = *flag;
                    }
                }
                Some(other) => warn!(key, value = %other, "ignoring non-boolean stored setting"),
            }
        }
        settings
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut bool> {
        match key {
            "animations" => Some(&mut self.animations),
            "soundEffects" => Some(&mut self.sound_effects),
            "autoSave" => Some(&mut self.auto_save),
            "showCompletedCount" => Some(&mut self.show_completed_count),
            "compactMode" => Some(&mut self.compact_mode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub animations: Option<bool>,
    pub sound_effects: Option<bool>,
    pub auto_save: Option<bool>,
    pub show_completed_count: Option<bool>,
    pub compact_mode: Option<bool>,
}

impl SettingsPatch {
    /// Builds a patch from `key=value` style pairs.
    ///
    /// Keys accept the camelCase names and their kebab/snake spellings;
    /// values accept the usual boolean words.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut patch = Self::default();
        for (key, value) in pairs {
            let key = key.as_ref().trim();
            let value = parse_bool(value.as_ref()).ok_or_else(|| {
                StoreError::InvalidInput(format!(
                    "setting {key} expects a boolean, got: {}",
                    value.as_ref().trim()
                ))
            })?;

            let normalized: String = key
                .chars()
                .filter(|ch| *ch != '-' && *ch != '_')
                .collect::<String>()
                .to_ascii_lowercase();
            let canonical = Settings::KEYS
                .into_iter()
                .find(|known| known.to_ascii_lowercase() == normalized)
                .ok_or_else(|| StoreError::InvalidInput(format!("unknown setting: {key}")))?;
            let slot = match canonical {
                "animations" => &mut patch.animations,
                "soundEffects" => &mut patch.sound_effects,
                "autoSave" => &mut patch.auto_save,
                "showCompletedCount" => &mut patch.show_completed_count,
                _ => &mut patch.compact_mode,
            };
            *slot = Some(value);
        }
        Ok(patch)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}

/// One immutable version of everything the store holds.
///
/// The store never edits a published state; each mutation builds the next
/// one, so a reader holding an older snapshot keeps a consistent view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreState {
    pub tasks: Vec<Task>,
    pub filter: FilterKey,
    pub search_term: String,
    pub theme: Theme,
    pub settings: Settings,
    pub last_updated: Option<DateTime<Utc>>,
}

impl StoreState {
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }
}
