//! Application settings
//!
//! Persisted as JSON to `<config dir>/audio-repeater/settings.json`
//! (`~/Library/Application Support/audio-repeater/` on macOS).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bitrate used when re-encoding to a lossy format
pub const DEFAULT_BITRATE_KBPS: u32 = 192;

/// Application-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Explicit ffmpeg binary; discovery is used when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Bitrate for MP3/M4A re-encodes, in kbps
    #[serde(default = "default_bitrate")]
    pub bitrate_kbps: u32,
    /// Kill ffmpeg if a single invocation runs longer than this
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
    /// Probe the output after ffmpeg runs and warn on duration drift
    #[serde(default = "default_true")]
    pub verify_output_duration: bool,
}

fn default_bitrate() -> u32 {
    DEFAULT_BITRATE_KBPS
}

fn default_true() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            tool_timeout_secs: None,
            verify_output_duration: true,
        }
    }
}

impl AppSettings {
    const SETTINGS_FILE: &'static str = "settings.json";

    /// Default location of the settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("audio-repeater").join(Self::SETTINGS_FILE))
    }

    /// Load settings from `path` (or the default location), falling back to
    /// defaults if the file is missing or invalid
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => p,
            None => {
                log::debug!("No config directory, using default settings");
                return Self::default();
            }
        };

        match Self::try_load(&path) {
            Ok(settings) => {
                log::debug!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::debug!("Using default settings: {}", e);
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Err(format!("Settings file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse settings: {}", e))
    }

    /// Save settings, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// ffmpeg bitrate argument, e.g. "192k"
    pub fn bitrate_arg(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.bitrate_kbps, 192);
        assert_eq!(settings.bitrate_arg(), "192k");
        assert!(settings.verify_output_duration);
        assert!(settings.ffmpeg_path.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = AppSettings {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            bitrate_kbps: 256,
            tool_timeout_secs: Some(90),
            verify_output_duration: false,
        };
        settings.save(&path).unwrap();

        let loaded = AppSettings::load(Some(&path));
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "bitrate_kbps": 320 }"#).unwrap();

        let loaded = AppSettings::load(Some(&path));
        assert_eq!(loaded.bitrate_kbps, 320);
        assert!(loaded.verify_output_duration);
        assert!(loaded.tool_timeout_secs.is_none());
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(AppSettings::load(Some(&path)), AppSettings::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let loaded = AppSettings::load(Some(Path::new("/nonexistent/settings.json")));
        assert_eq!(loaded, AppSettings::default());
    }
}
