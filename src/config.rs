//! Configuration loading and types for stashd.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, the bootstrap user, catalog persistence, blob
//! storage, backups, and upload policy.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bootstrap admin user seeded into a fresh catalog.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Catalog snapshot settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Blob storage settings.
    #[serde(default)]
    pub blobs: BlobsConfig,

    /// Catalog backup settings.
    #[serde(default)]
    pub backup: BackupConfig,

    /// Upload policy settings.
    #[serde(default)]
    pub uploads: UploadsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bootstrap: BootstrapConfig::default(),
            catalog: CatalogConfig::default(),
            blobs: BlobsConfig::default(),
            backup: BackupConfig::default(),
            uploads: UploadsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted file size in bytes (default 64 MiB).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Bootstrap admin user.
///
/// Seeded into the catalog the first time `load()` finds no snapshot
/// on disk. Ignored afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Admin username.
    #[serde(default = "default_admin_username")]
    pub username: String,

    /// Admin password (flat lookup, no hashing).
    #[serde(default = "default_admin_password")]
    pub password: String,

    /// Admin display name.
    #[serde(default = "default_admin_display")]
    pub display_name: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: default_admin_password(),
            display_name: default_admin_display(),
        }
    }
}

/// Catalog snapshot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Path to the JSON catalog snapshot file.
    #[serde(default = "default_catalog_path")]
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobsConfig {
    /// Root directory for stored blobs.
    #[serde(default = "default_blobs_root")]
    pub root_dir: String,
}

impl Default for BlobsConfig {
    fn default() -> Self {
        Self {
            root_dir: default_blobs_root(),
        }
    }
}

/// Catalog backup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Directory where timestamped catalog archives are written.
    #[serde(default = "default_backup_dir")]
    pub dir: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
        }
    }
}

/// Upload policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    /// File extensions accepted by `put` (lowercase, leading dot).
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9414
}

fn default_max_file_size() -> u64 {
    67_108_864 // 64 MiB
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

fn default_admin_display() -> String {
    "Administrator".to_string()
}

fn default_catalog_path() -> String {
    "./data/catalog.json".to_string()
}

fn default_blobs_root() -> String {
    "./data/blobs".to_string()
}

fn default_backup_dir() -> String {
    "./data/backups".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".js".to_string(), ".png".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
