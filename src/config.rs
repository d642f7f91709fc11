use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use which::which;

use crate::{NotoError, Result, SyncSettings};

const CONFIG_FILE: &str = "config.json";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("app", "noto", "noto")
}

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root of the local document store
    pub data_dir: PathBuf,

    /// Where exports and backups are written
    pub export_dir: PathBuf,

    /// Signed-in user; commands that touch notes need one
    pub user_id: Option<String>,

    /// Quiet interval before an edited note is written (ms)
    pub update_debounce_ms: u64,

    /// Quiet interval before a search query is applied (ms)
    pub search_debounce_ms: u64,

    /// How long the "saved" indicator stays up (ms)
    pub saved_display_ms: u64,

    /// Default editor command
    pub editor_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".noto"));
        Self {
            export_dir: data_dir.join("exports"),
            data_dir,
            user_id: None,
            update_debounce_ms: 800,
            search_debounce_ms: 300,
            saved_display_ms: 2000,
            editor_command: None,
        }
    }
}

impl Config {
    /// The platform config file location.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Reads the config at `path` (or the default location), falling back to
    /// defaults when there is no file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            debug!("No config location available, using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| NotoError::ConfigError {
            message: format!("Invalid config file {}: {}", path.display(), e),
        })
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .ok_or_else(|| NotoError::ConfigError {
                message: "Could not determine a config file location".to_string(),
            })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| NotoError::DirectoryError {
                path: parent.to_path_buf(),
            })?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!("Saved configuration to {}", path.display());
        Ok(path)
    }

    /// Applies a `key=value` assignment from the command line.
    pub fn set_value(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .ok_or_else(|| NotoError::ConfigError {
                message: format!("Expected key=value, got: {}", assignment),
            })?;

        let millis = |value: &str| {
            value.parse::<u64>().map_err(|_| NotoError::ConfigError {
                message: format!("{} must be a number of milliseconds", key),
            })
        };
        let optional = |value: &str| (!value.is_empty()).then(|| value.to_string());

        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "export_dir" => self.export_dir = PathBuf::from(value),
            "user_id" => self.user_id = optional(value),
            "update_debounce_ms" => self.update_debounce_ms = millis(value)?,
            "search_debounce_ms" => self.search_debounce_ms = millis(value)?,
            "saved_display_ms" => self.saved_display_ms = millis(value)?,
            "editor_command" => self.editor_command = optional(value),
            _ => {
                return Err(NotoError::ConfigError {
                    message: format!("Unknown configuration key: {}", key),
                })
            }
        }
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            update_debounce: Duration::from_millis(self.update_debounce_ms),
            saved_display: Duration::from_millis(self.saved_display_ms),
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    // This method provides smart fallbacks when no editor is configured
    pub fn get_editor_command(&self) -> String {
        if let Some(editor) = &self.editor_command {
            return editor.clone();
        }

        if let Ok(editor) = std::env::var("EDITOR") {
            return editor;
        }

        if cfg!(windows) {
            "notepad".to_string()
        } else if cfg!(target_os = "macos") {
            "open -t".to_string()
        } else {
            for editor in &["nano", "vim", "vi", "emacs"] {
                if which(editor).is_ok() {
                    return editor.to_string();
                }
            }
            "nano".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("nope.json").as_path())).unwrap();
        assert_eq!(config.update_debounce_ms, 800);
        assert_eq!(config.search_debounce_ms, 300);
        assert_eq!(config.sync_settings(), SyncSettings::default());
    }

    #[test]
    fn save_then_load_keeps_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.set_value("user_id = alice").unwrap();
        config.set_value("update_debounce_ms=250").unwrap();
        config.save(Some(path.as_path())).unwrap();

        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded.user_id.as_deref(), Some("alice"));
        assert_eq!(loaded.sync_settings().update_debounce, Duration::from_millis(250));
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"user_id": "bob"}"#).unwrap();
        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.user_id.as_deref(), Some("bob"));
        assert_eq!(config.saved_display_ms, 2000);
    }

    #[test]
    fn rejects_bad_assignments() {
        let mut config = Config::default();
        assert!(config.set_value("no-equals").is_err());
        assert!(config.set_value("color=blue").is_err());
        assert!(config.set_value("update_debounce_ms=soon").is_err());
        config.set_value("editor_command=").unwrap();
        assert!(config.editor_command.is_none());
    }
}
