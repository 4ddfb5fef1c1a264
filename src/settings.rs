//! Host settings store.
//!
//! The host keeps every extension's settings in one JSON object keyed by
//! plugin id. This module reads and writes the record for this plugin and
//! leaves the other entries alone. Values written by the host UI may be
//! numbers or numeric strings, so reading is lenient and falls back to the
//! defaults field by field. A string counts by its leading number, so
//! `"250ms"` reads as 250 and `"1.5x"` as 1.5.
//!
//! Button placement and auto-install are host UI concerns; they are stored
//! and round-tripped but do not affect a capture.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CaptureConfig, Error, Result};

/// Key of this plugin's record in the host settings object
pub const PLUGIN_ID: &str = "kaka2";

/// The persisted settings record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    /// Settle delay before rasterization, in milliseconds
    pub screenshot_delay: u64,
    /// Output scale (device pixel ratio)
    pub screenshot_scale: f32,
    /// Use the alternate (markup) render mode
    pub use_foreign_object_rendering: bool,
    /// Install per-message capture buttons automatically
    pub auto_install_buttons: bool,
    /// Put the capture button next to the edit button
    pub alt_button_location: bool,
    /// Show the progress overlay
    pub debug_overlay: bool,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            screenshot_delay: 10,
            screenshot_scale: 2.0,
            use_foreign_object_rendering: true,
            auto_install_buttons: true,
            alt_button_location: true,
            debug_overlay: true,
        }
    }
}

impl PluginSettings {
    /// Merge a stored record over the defaults.
    pub fn from_record(record: &Value) -> Self {
        let defaults = Self::default();
        let Some(obj) = record.as_object() else {
            warn!("settings record is not an object, using defaults");
            return defaults;
        };

        let delay = match obj.get("screenshotDelay") {
            None => defaults.screenshot_delay,
            // unparsable delays disable the wait
            Some(v) => lenient_number(v).map(|d| d.max(0.0).trunc() as u64).unwrap_or(0),
        };
        let scale = obj
            .get("screenshotScale")
            .and_then(lenient_number)
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| s as f32)
            .unwrap_or(defaults.screenshot_scale);
        let flag = |key: &str, default: bool| obj.get(key).and_then(lenient_bool).unwrap_or(default);

        Self {
            screenshot_delay: delay,
            screenshot_scale: scale,
            use_foreign_object_rendering: flag("useForeignObjectRendering", defaults.use_foreign_object_rendering),
            auto_install_buttons: flag("autoInstallButtons", defaults.auto_install_buttons),
            alt_button_location: flag("altButtonLocation", defaults.alt_button_location),
            debug_overlay: flag("debugOverlay", defaults.debug_overlay),
        }
    }

    /// The capture configuration these settings describe
    pub fn to_config(&self) -> CaptureConfig {
        CaptureConfig {
            delay_ms: self.screenshot_delay,
            scale: self.screenshot_scale,
            use_alternate_render_mode: self.use_foreign_object_rendering,
            show_progress: self.debug_overlay,
            ..CaptureConfig::default()
        }
    }
}

fn lenient_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        _ => None,
    }
}

/// Longest numeric prefix of `s` (sign, digits, optional fraction).
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).map_or(false, u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).map_or(false, u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }
    s[..end].parse::<f64>().ok()
}

fn lenient_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" | "1" | "on" => Some(true),
            "false" | "0" | "off" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// JSON file holding the host's extension settings
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_root(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::ConfigError(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    /// Load this plugin's settings; a missing file or record yields defaults.
    pub fn load(&self) -> Result<PluginSettings> {
        let root = self.read_root()?;
        let settings = match root.get(PLUGIN_ID) {
            Some(record) => PluginSettings::from_record(record),
            None => PluginSettings::default(),
        };
        debug!("loaded settings from {}: {:?}", self.path.display(), settings);
        Ok(settings)
    }

    /// Persist this plugin's settings, keeping every other entry.
    pub fn save(&self, settings: &PluginSettings) -> Result<()> {
        let mut root = self.read_root()?;
        root.insert(PLUGIN_ID.to_string(), serde_json::to_value(settings)?);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(root))?)?;
        debug!("saved settings to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_take_defaults() {
        let s = PluginSettings::from_record(&json!({ "screenshotScale": 1.5 }));
        assert_eq!(s.screenshot_scale, 1.5);
        assert_eq!(s.screenshot_delay, 10);
        assert!(s.use_foreign_object_rendering);
    }

    #[test]
    fn lenient_values_from_the_host_ui() {
        let s = PluginSettings::from_record(&json!({
            "screenshotDelay": "250",
            "screenshotScale": "abc",
            "useForeignObjectRendering": false,
            "debugOverlay": "false"
        }));
        assert_eq!(s.screenshot_delay, 250);
        assert_eq!(s.screenshot_scale, 2.0);
        assert!(!s.use_foreign_object_rendering);
        assert!(!s.debug_overlay);

        let s = PluginSettings::from_record(&json!({ "screenshotDelay": -5, "screenshotScale": 0 }));
        assert_eq!(s.screenshot_delay, 0);
        assert_eq!(s.screenshot_scale, 2.0);

        let s = PluginSettings::from_record(&json!({ "screenshotDelay": "soon" }));
        assert_eq!(s.screenshot_delay, 0);

        assert_eq!(PluginSettings::from_record(&json!([1, 2])), PluginSettings::default());
    }

    #[test]
    fn strings_count_by_their_leading_number() {
        let s = PluginSettings::from_record(&json!({
            "screenshotDelay": "250ms",
            "screenshotScale": "1.5x"
        }));
        assert_eq!(s.screenshot_delay, 250);
        assert_eq!(s.screenshot_scale, 1.5);

        let s = PluginSettings::from_record(&json!({ "screenshotDelay": " 12.9 s", "screenshotScale": "3." }));
        assert_eq!(s.screenshot_delay, 12);
        assert_eq!(s.screenshot_scale, 3.0);

        assert_eq!(leading_number("-40px"), Some(-40.0));
        assert_eq!(leading_number(".5"), Some(0.5));
        assert_eq!(leading_number("x12"), None);
        assert_eq!(leading_number("-"), None);
        assert_eq!(leading_number(""), None);
    }

    #[test]
    fn converts_to_capture_config() {
        let s = PluginSettings {
            screenshot_delay: 0,
            use_foreign_object_rendering: false,
            ..Default::default()
        };
        let cfg = s.to_config();
        assert_eq!(cfg.delay_ms, 0);
        assert_eq!(cfg.scale, 2.0);
        assert!(!cfg.use_alternate_render_mode);

        // button placement is host UI only
        let buttons_off = PluginSettings {
            auto_install_buttons: false,
            alt_button_location: false,
            ..Default::default()
        };
        assert_eq!(buttons_off.to_config(), CaptureConfig::default());
    }

    #[test]
    fn save_keeps_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "other_ext": { "enabled": true } }"#).unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(store.load().unwrap(), PluginSettings::default());

        let custom = PluginSettings {
            screenshot_delay: 500,
            ..Default::default()
        };
        store.save(&custom).unwrap();
        assert_eq!(store.load().unwrap(), custom);

        let root: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(root["other_ext"]["enabled"], json!(true));
        assert_eq!(root[PLUGIN_ID]["screenshotDelay"], json!(500));
    }

    #[test]
    fn missing_file_yields_defaults_and_bad_root_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().unwrap(), PluginSettings::default());

        let path = dir.path().join("array.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(SettingsStore::new(&path).load(), Err(Error::ConfigError(_))));
    }
}
