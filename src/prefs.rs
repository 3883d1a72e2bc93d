//! The one durable user preference: the last-selected audio input device.
//!
//! Stored as a small JSON key-value file under the platform config
//! directory (`<config_dir>/music-mosaic/preferences.json`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error};

/// Preference persistence errors
#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("Failed to write preferences: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize preferences: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(rename = "audio-input-device", default)]
    pub audio_input_device: Option<String>,
}

/// File-backed preference store
pub struct PreferenceStore {
    path: Option<PathBuf>,
    prefs: Preferences,
}

impl PreferenceStore {
    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("music-mosaic");
            p.push("preferences.json");
            p
        })
    }

    /// Load from the platform config directory; missing or unreadable
    /// files yield defaults.
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load from an explicit location (`None` keeps preferences in memory)
    pub fn load_from(path: Option<PathBuf>) -> Self {
        let prefs = path
            .as_deref()
            .and_then(read_prefs)
            .unwrap_or_default();
        Self { path, prefs }
    }

    pub fn audio_input_device(&self) -> Option<&str> {
        self.prefs.audio_input_device.as_deref()
    }

    /// Record the selected device; writes only when it changed
    pub fn set_audio_input_device(&mut self, device_id: Option<String>) -> Result<(), PrefsError> {
        if self.prefs.audio_input_device == device_id {
            return Ok(());
        }
        self.prefs.audio_input_device = device_id;
        self.save()
    }

    pub fn save(&self) -> Result<(), PrefsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.prefs)?;
        fs::write(path, content)?;
        debug!("Saved preferences to {}", path.display());
        Ok(())
    }
}

fn read_prefs(path: &Path) -> Option<Preferences> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(prefs) => Some(prefs),
        Err(e) => {
            error!("Ignoring malformed preferences {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let mut store = PreferenceStore::load_from(Some(path.clone()));
        assert_eq!(store.audio_input_device(), None);
        store
            .set_audio_input_device(Some("USB Mic".to_string()))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"audio-input-device\""));

        let reloaded = PreferenceStore::load_from(Some(path));
        assert_eq!(reloaded.audio_input_device(), Some("USB Mic"));
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, "not json").unwrap();

        let store = PreferenceStore::load_from(Some(path));
        assert_eq!(store.audio_input_device(), None);
    }

    #[test]
    fn test_in_memory_store_never_writes() {
        let mut store = PreferenceStore::load_from(None);
        store.set_audio_input_device(Some("x".to_string())).unwrap();
        assert_eq!(store.audio_input_device(), Some("x"));
    }
}
