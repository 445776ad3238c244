// config.rs - Persisted user settings: last used parameters plus the knobs
// the window does not expose (ffmpeg location, archive naming, pacing)

use crate::batch::BatchSettings;
use crate::command::{OutputFormat, ScaleMode};
use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Explicit ffmpeg binary; looked up on `PATH` when unset.
    pub ffmpeg_path: Option<PathBuf>,

    pub width: u32,
    pub height: u32,
    pub background: String,
    pub mode: ScaleMode,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,

    pub inter_file_delay_ms: u64,

    pub archive_prefix: String,
    pub archive_name: String,

    pub last_output_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            width: 1920,
            height: 1080,
            background: "#000000".to_string(),
            mode: ScaleMode::Fit,
            output_format: OutputFormat::Jpeg,
            jpeg_quality: 2,
            inter_file_delay_ms: 100,
            archive_prefix: "widescreen_".to_string(),
            archive_name: "widescreen_images.zip".to_string(),
            last_output_dir: None,
        }
    }
}

impl AppConfig {
    /// `settings.json` in the platform config directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "image-batch-converter")
            .map(|dirs| dirs.config_dir().join("settings.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            inter_file_delay: Duration::from_millis(self.inter_file_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let config = AppConfig {
            width: 1280,
            height: 720,
            background: "#FFFFFF".into(),
            mode: ScaleMode::Fill,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "mode": "fill", "output_format": "png" }"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.mode, ScaleMode::Fill);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert_eq!(config.width, 1920);
        assert_eq!(config.batch_settings().inter_file_delay, Duration::from_millis(100));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Json(_))));
    }
}
