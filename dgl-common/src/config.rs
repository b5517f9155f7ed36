//! Configuration loading
//!
//! Each setting is resolved in priority order:
//! 1. Command-line argument (applied by the binary after loading)
//! 2. Environment variable (`DGL_*`)
//! 3. TOML config file
//! 4. Compiled default
//!
//! The TOML file is looked up at the explicit path (`--config`), then
//! `DGL_CONFIG`, then `./dgl.toml`, then `<config dir>/dgl/config.toml`.
//! A missing file is not an error; an unreadable or invalid one is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "DGL_CONFIG";
/// Environment variable holding the service credential for publishing
pub const SERVICE_CREDENTIAL_ENV: &str = "DGL_SERVICE_CREDENTIAL";

/// Logging section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Settings shared by all DGL binaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DglConfig {
    /// SQLite document store file
    pub store_path: PathBuf,
    /// Generated manifest file
    pub manifest_path: PathBuf,
    /// Root of the per-age image directories
    pub assets_dir: PathBuf,
    /// Directory receiving export artifacts
    pub export_dir: PathBuf,
    /// Emails allowed to run administrative actions
    pub admin_emails: Vec<String>,
    /// Quiet interval before an edit burst is written
    pub debounce_ms: u64,
    /// Listener re-read interval for writes made by other processes
    pub poll_interval_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for DglConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data/dgl.db"),
            manifest_path: PathBuf::from("data/manifest.json"),
            assets_dir: PathBuf::from("public/images"),
            export_dir: PathBuf::from("."),
            admin_emails: Vec::new(),
            debounce_ms: 200,
            poll_interval_ms: 500,
            logging: LoggingConfig::default(),
        }
    }
}

impl DglConfig {
    /// Load file settings (if any) and apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match locate_config_file(explicit)? {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                warn!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Overlay `DGL_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value("DGL_STORE_PATH") {
            self.store_path = PathBuf::from(path);
        }
        if let Some(path) = env_value("DGL_MANIFEST_PATH") {
            self.manifest_path = PathBuf::from(path);
        }
        if let Some(path) = env_value("DGL_ASSETS_DIR") {
            self.assets_dir = PathBuf::from(path);
        }
        if let Some(path) = env_value("DGL_EXPORT_DIR") {
            self.export_dir = PathBuf::from(path);
        }
        if let Some(emails) = env_value("DGL_ADMIN_EMAILS") {
            self.admin_emails = emails
                .split(',')
                .map(str::trim)
                .filter(|email| !email.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = env_value("DGL_DEBOUNCE_MS") {
            self.debounce_ms = parse_millis("DGL_DEBOUNCE_MS", &value)?;
        }
        if let Some(value) = env_value("DGL_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_millis("DGL_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(level) = env_value("DGL_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be greater than 0".to_string()));
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(Error::Config("store_path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        crate::time::millis_to_duration(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        crate::time::millis_to_duration(self.poll_interval_ms)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("Cannot encode TOML: {}", e)))
    }
}

/// Config file to load, if any
///
/// An explicitly named file (argument or `DGL_CONFIG`) must exist.
pub fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_value(CONFIG_ENV).map(PathBuf::from));
    if let Some(path) = named {
        return if path.is_file() {
            Ok(Some(path))
        } else {
            Err(Error::Config(format!("Config file not found: {}", path.display())))
        };
    }

    let local = PathBuf::from("dgl.toml");
    if local.is_file() {
        return Ok(Some(local));
    }

    Ok(dirs::config_dir()
        .map(|dir| dir.join("dgl").join("config.toml"))
        .filter(|path| path.is_file()))
}

/// Service credential for publishing to the store; required
pub fn service_credential() -> Result<String> {
    env_value(SERVICE_CREDENTIAL_ENV).ok_or_else(|| {
        Error::Config(format!(
            "{} is not set; a service credential is required to publish",
            SERVICE_CREDENTIAL_ENV
        ))
    })
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_millis(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a whole number of milliseconds, got {:?}", name, value)))
}
