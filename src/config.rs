//! Configuration for podcatch.
//!
//! Values are layered, lowest precedence first:
//!
//! 1. Built-in defaults (`Config::default()`)
//! 2. An optional TOML file (`PODCATCH_CONFIG`, default `podcatch.toml`).
//!    A missing or empty file yields the defaults.
//! 3. Environment variables (`DB_HOST`, `S3_BUCKET`, ...), which always win.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_VAR: &str = "PODCATCH_CONFIG";

/// Config file used when `PODCATCH_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "podcatch.toml";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
}

/// PostgreSQL connection settings.
///
/// Custom Debug impl masks `password`.
#[derive(Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: SecretString::from("postgres"),
            name: "podcasts".to_string(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .finish()
    }
}

/// S3-compatible object storage settings (MinIO by default).
///
/// Custom Debug impl masks `secret_key`.
#[derive(Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Host and port of the storage service, without scheme.
    pub endpoint: String,
    pub access_key: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub secret_key: SecretString,
    pub use_ssl: bool,
    pub bucket: String,
    pub region: String,
    /// Where media is staged between download and upload.
    pub staging_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: SecretString::from("minioadmin"),
            use_ssl: false,
            bucket: "podcasts".to_string(),
            region: "us-east-1".to_string(),
            staging_dir: std::env::temp_dir(),
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("use_ssl", &self.use_ssl)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("staging_dir", &self.staging_dir)
            .finish()
    }
}

impl StorageConfig {
    /// Endpoint with the scheme implied by `use_ssl`.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            return self.endpoint.clone();
        }
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.endpoint)
    }
}

/// Where candidate feed URLs come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Line-delimited list of feed URLs.
    pub feed_list: PathBuf,
    /// OPML files in priority order. The first one is the primary source.
    pub opml: Vec<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feed_list: PathBuf::from("feeds.txt"),
            opml: vec![
                PathBuf::from("podcasts.opml"),
                PathBuf::from("subscriptions.opml"),
            ],
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Loads the file named by `PODCATCH_CONFIG` (or `podcatch.toml`) and
    /// applies process environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["database", "storage", "sources"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Overrides fields from environment variables.
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(v) = lookup("DB_HOST") {
            db.host = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            db.port = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "DB_PORT",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("DB_USER") {
            db.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            db.password = SecretString::from(v);
        }
        if let Some(v) = lookup("DB_NAME") {
            db.name = v;
        }

        let storage = &mut self.storage;
        if let Some(v) = lookup("S3_ENDPOINT") {
            storage.endpoint = v;
        }
        if let Some(v) = lookup("S3_ACCESS_KEY") {
            storage.access_key = v;
        }
        if let Some(v) = lookup("S3_SECRET_KEY") {
            storage.secret_key = SecretString::from(v);
        }
        if let Some(v) = lookup("S3_USE_SSL") {
            storage.use_ssl = parse_bool(&v).ok_or(ConfigError::InvalidValue {
                key: "S3_USE_SSL",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("S3_BUCKET") {
            storage.bucket = v;
        }
        if let Some(v) = lookup("S3_REGION") {
            storage.region = v;
        }
        if let Some(v) = lookup("STAGING_DIR") {
            storage.staging_dir = PathBuf::from(v);
        }

        if let Some(v) = lookup("FEED_LIST_PATH") {
            self.sources.feed_list = PathBuf::from(v);
        }
        if let Some(v) = lookup("OPML_PATHS") {
            self.sources.opml = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        Ok(())
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
