//! Configuration management for Threadline
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Platform connector configuration
    pub connector: ConnectorConfig,

    /// Sync orchestrator configuration
    pub sync: SyncConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for one embedding request
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Delay between embedding batches in milliseconds
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectorConfig {
    /// Platform API base URL
    #[serde(default = "default_platform_base_url")]
    pub base_url: String,

    /// Outbound requests per second (token bucket); 0 disables pacing
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Bounded attempt count for rate-limited / transient requests
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff in milliseconds when no server wait hint is given
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Page size requested from paginated list endpoints
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Overlap window subtracted from last_sync_at for incremental runs,
    /// tolerating clock skew and late-arriving edits
    #[serde(default = "default_safety_margin")]
    pub safety_margin_secs: u64,

    /// Runaway-prevention cap on pages fetched per conversation
    #[serde(default = "default_max_pages_per_channel")]
    pub max_pages_per_channel: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-ada-002".to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_embedding_batch_size() -> usize { 10 }
fn default_inter_batch_delay_ms() -> u64 { 1000 }
fn default_platform_base_url() -> String { "https://slack.com/api".to_string() }
fn default_requests_per_second() -> u32 { 5 }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 1000 }
fn default_request_timeout() -> u64 { 30 }
fn default_page_size() -> usize { 200 }
fn default_safety_margin() -> u64 { 300 }
fn default_max_pages_per_channel() -> usize { 200 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "threadline".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__CONNECTOR__PAGE_SIZE=100
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Incremental overlap window as a Duration
    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.sync.safety_margin_secs)
    }

    /// Delay between embedding batches as a Duration
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.embedding.inter_batch_delay_ms)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl ConnectorConfig {
    /// Initial backoff as a Duration
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/threadline".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
                batch_size: default_embedding_batch_size(),
                inter_batch_delay_ms: default_inter_batch_delay_ms(),
            },
            connector: ConnectorConfig::default(),
            sync: SyncConfig::default(),
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                service_name: default_service_name(),
            },
        }
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_base_url(),
            requests_per_second: default_requests_per_second(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            request_timeout_secs: default_request_timeout(),
            page_size: default_page_size(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            safety_margin_secs: default_safety_margin(),
            max_pages_per_channel: default_max_pages_per_channel(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.connector.max_attempts, 3);
        assert_eq!(config.connector.page_size, 200);
        assert_eq!(config.sync.max_pages_per_channel, 200);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/threadline");
    }

    #[test]
    fn test_safety_margin_duration() {
        let config = AppConfig::default();
        assert_eq!(config.safety_margin(), Duration::from_secs(300));
    }
}
