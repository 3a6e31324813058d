//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults and a few
//! environment overrides for secrets and backend selection.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::{env, fs};
use log::{info, warn};

pub use crate::metadata::config::{MetadataBackend, MetadataConfig};
pub use crate::storage::config::{StorageBackend, StorageConfig};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Blob storage configuration
    pub storage: StorageConfig,
    /// Section record storage configuration
    pub metadata: MetadataConfig,
    /// Operator credentials
    pub auth: AuthConfig,
    /// Upload limits
    pub upload: UploadConfig,
    /// Reconcile worker configuration
    pub reconcile: ReconcileConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Maximum JSON body size in bytes
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9710,
            workers: 4,
            max_payload_size: 1024 * 1024,
        }
    }
}

/// The single operator identity allowed to modify the gallery
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    /// Both secrets must be set for any credential check to pass
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Upload limits enforced before an image reaches the gallery service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted image in bytes
    pub max_image_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { max_image_bytes: 5 * 1024 * 1024 }
    }
}

/// Reconcile worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Enable the reconcile worker
    pub enabled: bool,
    /// Seconds between passes
    pub interval_secs: u64,
    /// Unreferenced objects younger than this are left alone
    pub grace_period_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 3600,
            grace_period_secs: 600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { config_file: "server_log.yaml".to_string() }
    }
}

impl AppConfig {
    /// Configuration file path: `GALLERY_CONFIG` or `config.yaml`
    pub fn config_path() -> String {
        env::var("GALLERY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load configuration from `config_path()`, then apply environment overrides
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::from_file(Self::config_path())?;
        config.apply_env();
        Ok(config)
    }

    /// Conditions an operator should hear about at startup
    pub fn startup_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let path = Self::config_path();
        if !Path::new(&path).exists() {
            warnings.push(format!("Config file {} not found, using defaults", path));
        }
        if !self.auth.is_configured() {
            warnings.push("Operator credentials are not configured; every write request will be rejected".to_string());
        }
        warnings
    }

    /// Report the effective configuration.
    ///
    /// Loading runs before the logger exists, so the binary calls this once
    /// logging is initialized.
    pub fn log_startup(&self) {
        info!("Configuration source: {}", Self::config_path());
        info!(
            "Storage backend {:?} at {}, metadata backend {:?} at {}",
            self.storage.backend, self.storage.base_path, self.metadata.backend, self.metadata.db_path
        );
        for warning in self.startup_warnings() {
            warn!("{}", warning);
        }
    }

    /// Load configuration from a YAML file, use defaults if it does not exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Environment overrides: operator secrets, port, and backend selection
    pub fn apply_env(&mut self) {
        if let Ok(username) = env::var("ADMIN_USERNAME") {
            self.auth.username = username;
        }
        if let Ok(password) = env::var("ADMIN_PASSWORD") {
            self.auth.password = password;
        }
        if let Ok(port) = env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid PORT value: {}", port),
            }
        }
        self.storage.apply_env();
        self.metadata.apply_env();
    }
}
