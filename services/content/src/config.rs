use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the content service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob (uploaded image) configuration
    #[serde(default)]
    pub blobs: BlobConfig,
    /// JSON document configuration (document backend only)
    #[serde(default)]
    pub document: DocumentConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Which persistence shape backs the content API
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// SQLite metadata plus a directory of blob files
    #[default]
    Relational,
    /// A single JSON document keyed by content section
    Document,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Persistence backend
    #[serde(default)]
    pub backend: Backend,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    /// Directory holding uploaded image files
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// URL path prefix the upload directory is served under
    #[serde(default = "default_serve_prefix")]
    pub serve_prefix: String,
}

/// JSON document backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// Path of the content document
    #[serde(default = "default_document_path")]
    pub path: PathBuf,
    /// Site name written into a freshly created document
    #[serde(default = "default_site_name")]
    pub site_name: String,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Directory of the static site, served for every non-API path
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Maximum request body size; base64 uploads are large
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "content-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_database_url() -> String {
    "sqlite://data/shrine_data.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_serve_prefix() -> String {
    "/uploads".to_string()
}

fn default_document_path() -> PathBuf {
    PathBuf::from("data/content.json")
}

fn default_site_name() -> String {
    "Our Lady of Lourdes Shrine".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024 // 50MB
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/content").required(false))
            .add_source(config::File::with_name("/etc/shrine/content").required(false))
            // CONTENT__API__PORT -> api.port
            .add_source(
                config::Environment::with_prefix("CONTENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the router cannot be built from
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.blobs.serve_prefix.trim_matches('/').is_empty() {
            anyhow::bail!(
                "blobs.serve_prefix must name a path segment, got {:?}",
                self.blobs.serve_prefix
            );
        }
        Ok(())
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
            backend: Backend::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            run_migrations: true,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            serve_prefix: default_serve_prefix(),
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            path: default_document_path(),
            site_name: default_site_name(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            static_dir: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
