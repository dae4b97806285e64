use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the upload service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Shared AWS SDK configuration
    #[serde(default)]
    pub aws: AwsConfig,
    /// S3 configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Event bus configuration
    #[serde(default)]
    pub events: EventsConfig,
    /// HTTP API configuration (only used in http runtime)
    #[serde(default)]
    pub api: ApiConfig,
}

/// How the service receives requests
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    /// AWS Lambda runtime loop
    #[default]
    Lambda,
    /// Standalone HTTP server
    Http,
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
    /// Request source
    #[serde(default)]
    pub runtime: Runtime,
    /// Metrics port (http runtime only)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

/// AWS SDK settings shared by the S3 and EventBridge clients
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Attempts per SDK call, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Bucket used when a request does not name one
    pub default_bucket: Option<String>,
    /// Content type written on every object
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

/// Which processing events accompany the upload event
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// `lambda` and `eks` families, variants 1 to 3, regardless of the request
    #[default]
    Fixed,
    /// One event per model named in the request
    Requested,
}

/// EventBridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Target event bus
    #[serde(default = "default_bus_name")]
    pub bus_name: String,
    /// `Source` attached to every entry
    #[serde(default = "default_event_source")]
    pub source: String,
    /// Processing event fan-out
    #[serde(default)]
    pub fan_out: FanOut,
    /// Detail schema version
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Custom endpoint URL (for LocalStack)
    pub endpoint_url: Option<String>,
}

/// API configuration for the http runtime
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
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "image-upload".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    0
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_content_type() -> String {
    "image/jpeg".to_string()
}

fn default_bus_name() -> String {
    "default".to_string()
}

fn default_event_source() -> String {
    "custom.imageUpload".to_string()
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_body_limit_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/upload").required(false))
            .add_source(config::File::with_name("/etc/image-upload/upload").required(false))
            // Override with environment variables
            // UPLOAD__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("UPLOAD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl DatabaseConfig {
    /// How long to wait for a pooled connection
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// How long an unused pooled connection is kept
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            runtime: Runtime::default(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            force_path_style: false,
            default_bucket: None,
            content_type: default_content_type(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            bus_name: default_bus_name(),
            source: default_event_source(),
            fan_out: FanOut::default(),
            schema_version: default_schema_version(),
            endpoint_url: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let events = EventsConfig::default();
        assert_eq!(events.bus_name, "default");
        assert_eq!(events.source, "custom.imageUpload");
        assert_eq!(events.fan_out, FanOut::Fixed);
        assert_eq!(S3Config::default().content_type, "image/jpeg");
        assert_eq!(AwsConfig::default().max_attempts, 3);
        assert_eq!(ServiceConfig::default().runtime, Runtime::Lambda);
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = config::Config::builder()
            .set_override("database.url", "postgres://localhost/photos")
            .unwrap()
            .set_override("events.fan_out", "requested")
            .unwrap()
            .set_override("service.runtime", "http")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.url, "postgres://localhost/photos");
        assert_eq!(config.database.max_connections, 5);
        assert!(!config.database.run_migrations);
        assert_eq!(config.events.fan_out, FanOut::Requested);
        assert_eq!(config.service.runtime, Runtime::Http);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.database.acquire_timeout(), Duration::from_secs(10));
        assert_eq!(config.database.idle_timeout(), Duration::from_secs(600));
    }
}
