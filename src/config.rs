//! User preferences: where the remote CLIs live and where session state goes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::atomic_write;

/// Application identifier used for the app data directory.
pub const APP_IDENTIFIER: &str = "com.nucleus-sync.app";

pub const ENV_CLI: &str = "NUCLEUS_CLI";
pub const ENV_LIVE_CLI: &str = "NUCLEUS_LIVE_CLI";
pub const ENV_LOCAL_DIR: &str = "NUCLEUS_LOCAL_DIR";

const DEFAULT_CLI: &str = "nucleus-cli";
const DEFAULT_LIVE_CLI: &str = "nucleus-live-cli";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid preferences file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not resolve app data directory")]
    NoAppDataDir,
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// One-shot remote-store CLI.
    pub cli_path: PathBuf,
    /// Live-session CLI.
    pub live_cli_path: PathBuf,
    /// Session-local state and staging directory.
    pub local_directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let local_directory = get_app_data_dir()
            .map(|dir| dir.join("session_local"))
            .unwrap_or_else(|_| PathBuf::from("session_local"));
        Self {
            cli_path: PathBuf::from(DEFAULT_CLI),
            live_cli_path: PathBuf::from(DEFAULT_LIVE_CLI),
            local_directory,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::load_from(&config_path()?)?;
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Load a preferences file, writing defaults if it does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            info!(path = %path.display(), "Created default preferences");
            return Ok(config);
        }
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded preferences");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes())?;
        Ok(())
    }

    /// Replace fields whose environment variable is set and non-empty.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = var(ENV_CLI) {
            self.cli_path = PathBuf::from(path);
        }
        if let Some(path) = var(ENV_LIVE_CLI) {
            self.live_cli_path = PathBuf::from(path);
        }
        if let Some(path) = var(ENV_LOCAL_DIR) {
            self.local_directory = PathBuf::from(path);
        }
        self
    }

    /// Directory for per-operation upload and download files.
    pub fn staging_dir(&self) -> PathBuf {
        self.local_directory.join("staging")
    }

    /// Directory holding the local JSON workspace.
    pub fn workspace_dir(&self) -> PathBuf {
        self.local_directory.join("workspace")
    }
}

/// App data directory for CLI use.
pub fn get_app_data_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::data_dir().ok_or(ConfigError::NoAppDataDir)?;
    Ok(base.join(APP_IDENTIFIER))
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(get_app_data_dir()?.join("config").join("preferences.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("preferences.json");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.cli_path, PathBuf::from(DEFAULT_CLI));
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, r#"{"cliPath": "/opt/nucleus/cli"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cli_path, PathBuf::from("/opt/nucleus/cli"));
        assert_eq!(config.live_cli_path, PathBuf::from(DEFAULT_LIVE_CLI));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CLI, "/usr/local/bin/ncli"),
            (ENV_LOCAL_DIR, "/tmp/nucleus"),
            (ENV_LIVE_CLI, "  "),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.cli_path, PathBuf::from("/usr/local/bin/ncli"));
        assert_eq!(config.live_cli_path, PathBuf::from(DEFAULT_LIVE_CLI));
        assert_eq!(config.staging_dir(), PathBuf::from("/tmp/nucleus/staging"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Json(_))));
    }
}
