//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILGRAB_CONFIG` (environment variable)
//! 2. `~/.config/mailgrab/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailgrab\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override every value read here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MailgrabError, Result};
use crate::session::imap::{GMAIL_HOST, IMAPS_PORT};

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "MAILGRAB_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mail account and server.
    pub account: AccountConfig,
    /// What to scan for and where to save it.
    pub scan: ScanConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for the log file.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Mail account and server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Login address.
    pub email: Option<String>,
    pub host: String,
    pub port: u16,
    /// File holding the (app) password. Never put the password itself here.
    pub password_file: Option<PathBuf>,
}

/// Scan defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Label to scan.
    pub label: String,
    /// Only messages from this address are considered.
    pub sender: String,
    /// Where attachments are saved.
    pub output_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            email: None,
            host: GMAIL_HOST.to_string(),
            port: IMAPS_PORT,
            password_file: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            label: "Bills".to_string(),
            sender: "do-not-reply@gett.com".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    match load_config_from(&path) {
        Ok(cfg) => {
            tracing::info!(path = %path.display(), "Loaded config");
            cfg
        }
        Err(e) => {
            tracing::warn!(error = %e, "Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit file. Unlike [`load_config`], a
/// missing or malformed file is an error.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| MailgrabError::io(path, e))?;
    toml::from_str(&contents)
        .map_err(|e| MailgrabError::Config(format!("{}: {e}", path.display())))
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailgrab").join("config.toml"))
}

/// Return the cache directory for the log file.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailgrab")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailgrab.log")
}
