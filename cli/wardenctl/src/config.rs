//! Configuration and credential storage.
//!
//! Settings live in `config.json` under the platform config directory; the
//! bearer token comes from `WARDEN_TOKEN` or `credentials.json` next to it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.json";
const CREDENTIALS_FILE: &str = "credentials.json";

const API_URL_ENV: &str = "WARDEN_API_URL";
const STATE_DIR_ENV: &str = "WARDEN_STATE_DIR";
const TOKEN_ENV: &str = "WARDEN_TOKEN";

const DEFAULT_API_URL: &str = "http://localhost:8080";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "warden", "wardenctl")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// IAM service base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Directory holding state records. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Overrides the client's `Api-Version` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            state_dir: None,
            log_format: LogFormat::default(),
            api_version: None,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load config from disk (or defaults), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_dir()?.join(CONFIG_FILE))?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(dir) = var(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
            self.state_dir = Some(PathBuf::from(dir));
        }
    }

    /// Resolved state directory.
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().join("state")),
        }
    }
}

/// Stored credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token for the IAM service.
    pub token: String,

    /// When the token was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Credentials {
    pub fn new(token: String) -> Self {
        Self {
            token,
            saved_at: Some(chrono::Utc::now()),
        }
    }

    /// `WARDEN_TOKEN` wins over the credentials file.
    pub fn load() -> Result<Option<Self>> {
        if let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
            return Ok(Some(Self {
                token,
                saved_at: None,
            }));
        }
        Self::load_from(&config_dir()?.join(CREDENTIALS_FILE))
    }

    fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials from {:?}", path))?;

        let creds = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials from {:?}", path))?;

        Ok(Some(creds))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let dir = config_dir()?;
        let path = dir.join(CREDENTIALS_FILE);
        self.save_to(&path)?;
        Ok(path)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let contents = serde_json::to_string_pretty(self)?;

        // Owner-only permissions on Unix
        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to write credentials to {:?}", path))?;
            file.write_all(contents.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents)
                .with_context(|| format!("Failed to write credentials to {:?}", path))?;
        }

        Ok(())
    }

    /// Delete the credentials file. Returns whether one existed.
    pub fn delete() -> Result<bool> {
        let path = config_dir()?.join(CREDENTIALS_FILE);

        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete credentials at {:?}", path))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.log_format, LogFormat::Plain);
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn test_missing_config_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"log_format": "json", "api_version": "2"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.api_version.as_deref(), Some("2"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            API_URL_ENV => Some("https://iam.example.com".to_string()),
            STATE_DIR_ENV => Some("/var/lib/warden".to_string()),
            _ => None,
        });

        assert_eq!(config.api_url, "https://iam.example.com");
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/var/lib/warden"));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_credentials_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CREDENTIALS_FILE);

        let creds = Credentials::new("test-token".to_string());
        creds.save_to(&path).unwrap();

        let loaded = Credentials::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded, creds);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
