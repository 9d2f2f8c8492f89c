//! Preference persistence with default-merge semantics

use std::path::{Path, PathBuf};

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::fs_util;

/// Window position and size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    pub width: f32,
    pub height: f32,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            width: 1100.0,
            height: 750.0,
        }
    }
}

/// Open map of named preferences.
///
/// Unknown keys are carried through load and save untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Default for Settings {
    fn default() -> Self {
        let defaults = json!({
            "lineEnding": "lf",
            "autoIndent": true,
            "indentChar": "space",
            "tabSize": 4,
            "indentSize": 4,
            "wordWrap": true,
            "defaultImageWidth": 400,
            "windowBounds": WindowBounds::default(),
        });
        match defaults {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }
}

impl Settings {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Overlay every key of `partial` onto these settings
    pub fn merge(&mut self, partial: Map<String, Value>) {
        self.0.extend(partial);
    }

    fn typed<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn line_ending(&self) -> String {
        self.typed("lineEnding").unwrap_or_else(|| "lf".to_string())
    }

    pub fn auto_indent(&self) -> bool {
        self.typed("autoIndent").unwrap_or(true)
    }

    pub fn indent_char(&self) -> String {
        self.typed("indentChar").unwrap_or_else(|| "space".to_string())
    }

    pub fn tab_size(&self) -> usize {
        self.typed("tabSize").unwrap_or(4)
    }

    pub fn indent_size(&self) -> usize {
        self.typed("indentSize").unwrap_or(4)
    }

    pub fn word_wrap(&self) -> bool {
        self.typed("wordWrap").unwrap_or(true)
    }

    pub fn default_image_width(&self) -> u32 {
        self.typed("defaultImageWidth").unwrap_or(400)
    }

    pub fn window_bounds(&self) -> WindowBounds {
        self.typed("windowBounds").unwrap_or_default()
    }
}

/// Owner of the settings file
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform config location
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "txti", "Txti")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(Self::new(dirs.config_dir().join("settings.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_persisted(&self) -> Option<Map<String, Value>> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => {
                tracing::warn!("Ignoring non-object settings in {}", self.path.display());
                None
            }
            Err(e) => {
                tracing::warn!("Failed to parse settings {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Persisted settings merged over defaults; never fails
    pub fn load(&self) -> Settings {
        let mut settings = Settings::default();
        if let Some(persisted) = self.read_persisted() {
            settings.merge(persisted);
        }
        settings
    }

    /// Merge `partial` over the current settings and write them back.
    ///
    /// Returns `false` if the file could not be written.
    pub fn save(&self, partial: Map<String, Value>) -> bool {
        let mut settings = self.load();
        settings.merge(partial);

        let content = match serde_json::to_vec_pretty(&settings) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to serialize settings: {}", e);
                return false;
            }
        };

        match fs_util::write_atomic(&self.path, &content) {
            Ok(()) => {
                tracing::info!("Saved settings to: {}", self.path.display());
                true
            }
            Err(e) => {
                tracing::warn!("Failed to save settings to {}: {}", self.path.display(), e);
                false
            }
        }
    }
}
