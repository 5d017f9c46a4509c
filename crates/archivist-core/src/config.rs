//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the auth backend URL, the resource endpoint, archive upload settings and
//! the last identifier used to log in.
//!
//! Configuration is stored at `~/.config/archivist/config.json`. Environment
//! variables override file values at load time (see `apply_env`).

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "archivist";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_AUTH_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_S3_ENDPOINT: &str = "https://s3.us.archive.org";
const DEFAULT_DOWNLOAD_BASE: &str = "https://archive.org/download";
const DEFAULT_COLLECTION: &str = "opensource";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth_base_url: String,
    pub resource_endpoint: Option<String>,
    pub archive: ArchiveConfig,
    pub last_identifier: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            resource_endpoint: None,
            archive: ArchiveConfig::default(),
            last_identifier: None,
        }
    }
}

/// Settings for the archive upload client.
///
/// The secret key is never written to the config file; it comes from the
/// environment or the OS keychain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub s3_endpoint: String,
    pub download_base: String,
    pub collection: String,
    pub access_key: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            s3_endpoint: DEFAULT_S3_ENDPOINT.to_string(),
            download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            access_key: None,
            secret_key: None,
        }
    }
}

impl ArchiveConfig {
    /// Both keys present and non-empty
    pub fn has_credentials(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.trim().is_empty());
        present(&self.access_key) && present(&self.secret_key)
    }
}

impl Config {
    /// Load from the config file (defaults if absent), then apply env overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay values from the environment. Empty variables are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("ARCHIVIST_AUTH_URL") {
            self.auth_base_url = v;
        }
        if let Some(v) = var("ARCHIVIST_RESOURCE_URL") {
            self.resource_endpoint = Some(v);
        }
        if let Some(v) = var("ARCHIVIST_S3_ENDPOINT") {
            self.archive.s3_endpoint = v;
        }
        if let Some(v) = var("ARCHIVIST_DOWNLOAD_BASE") {
            self.archive.download_base = v;
        }
        if let Some(v) = var("ARCHIVIST_COLLECTION") {
            self.archive.collection = v;
        }
        if let Some(v) = var("ARCHIVIST_ACCESS_KEY") {
            self.archive.access_key = Some(v);
        }
        if let Some(v) = var("ARCHIVIST_SECRET_KEY") {
            self.archive.secret_key = Some(v);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the durable session store and log files
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
