//! Resdex configuration
//!
//! A small TOML file telling the CLI where the discovery lives, which
//! storage backend it uses and which directory serves as the resource
//! repository. Command-line flags override every value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "RESDEX_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown config key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// How the discovery is persisted
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One JSON document
    #[default]
    Json,
    /// JSON-file key-value store
    Kv,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Backend::Json),
            "kv" => Ok(Backend::Kv),
            other => Err(format!("expected 'json' or 'kv', got '{}'", other)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Json => f.write_str("json"),
            Backend::Kv => f.write_str("kv"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl Config {
    pub const KEYS: [&'static str; 4] = ["discovery-path", "repository-root", "backend", "log-file"];

    /// Config file location: `RESDEX_CONFIG` when set, else the user config dir
    pub fn path() -> PathBuf {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let trimmed = env_path.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }

        dirs::config_dir().map_or_else(
            || PathBuf::from(".resdex").join("resdex.toml"),
            |dir| dir.join("resdex").join("resdex.toml"),
        )
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path())
    }

    /// Load from `path`; a missing file is the default config
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "discovery-path" => self.discovery_path.clone(),
            "repository-root" => self.repository_root.clone(),
            "backend" => self.backend.map(|b| b.to_string()),
            "log-file" => self.log_file.clone(),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: String) -> Result<(), ConfigError> {
        match key {
            "discovery-path" => self.discovery_path = Some(value),
            "repository-root" => self.repository_root = Some(value),
            "backend" => {
                let backend = value.parse().map_err(|reason| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.clone(),
                    reason,
                })?;
                self.backend = Some(backend);
            }
            "log-file" => self.log_file = Some(value),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.discovery_path.is_none()
            && self.repository_root.is_none()
            && self.backend.is_none()
            && self.log_file.is_none()
    }

    /// Set values as `(key, value)` pairs, in key order
    pub fn values_iter(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }

    pub fn get_backend(&self) -> Backend {
        self.backend.unwrap_or_default()
    }

    /// Discovery file, defaulting to a per-backend file in the user data dir
    pub fn get_discovery_path(&self) -> PathBuf {
        if let Some(path) = &self.discovery_path {
            return PathBuf::from(path);
        }
        let file = match self.get_backend() {
            Backend::Json => "discovery.json",
            Backend::Kv => "store.json",
        };
        dirs::data_dir().map_or_else(
            || PathBuf::from(".resdex").join(file),
            |dir| dir.join("resdex").join(file),
        )
    }

    /// Repository root, defaulting to the working directory
    pub fn get_repository_root(&self) -> PathBuf {
        self.repository_root
            .as_ref()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_and_values() {
        let mut config = Config::default();
        assert!(config.is_empty());
        assert!(config.set("backend", "KV".to_string()).is_ok());
        assert!(config.set("repository-root", "/srv/app".to_string()).is_ok());

        assert_eq!(config.get("backend").as_deref(), Some("kv"));
        assert_eq!(config.get_backend(), Backend::Kv);
        assert_eq!(config.get_repository_root(), PathBuf::from("/srv/app"));
        assert_eq!(
            config.values_iter(),
            vec![
                ("repository-root", "/srv/app".to_string()),
                ("backend", "kv".to_string())
            ]
        );
        assert!(config.get_discovery_path().ends_with("store.json"));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("colour", "blue".to_string()),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            config.set("backend", "sqlite".to_string()),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(config.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("nested").join("resdex.toml");
        assert!(Config::load_from(&path).is_ok_and(|c| c.is_empty()));

        let config = Config {
            discovery_path: Some("/tmp/discovery.json".to_string()),
            backend: Some(Backend::Json),
            ..Default::default()
        };
        assert!(config.save_to(&path).is_ok());

        let content = fs::read_to_string(&path).unwrap_or_default();
        assert!(content.contains("backend = \"json\""));
        assert!(Config::load_from(&path).is_ok_and(|loaded| loaded == config));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("resdex.toml");
        assert!(fs::write(&path, "backend = [").is_ok());
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
