//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deployment environment name ("development", "production", ...).
    #[serde(default = "default_env")]
    pub env: String,
    /// Verbose diagnostics.
    #[serde(default)]
    pub debug: bool,
    /// Allowed CORS origins; "*" allows any.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

/// Auth configuration. The secret is shared with the external auth service
/// that issues the bearer tokens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
}

/// Shared store (L2 cache + fan-out bus) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SharedStoreConfig {
    /// Connection URL, e.g. "redis://localhost:6379/0".
    #[serde(default = "default_shared_store_url")]
    pub url: String,
    /// Pub/sub channel for cross-node updates.
    #[serde(default = "default_pubsub_channel")]
    pub pubsub_channel: String,
    /// Per-operation timeout in milliseconds.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl SharedStoreConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Durable store (system of record) configuration. The backend is chosen
/// by URL scheme: `postgres://` for production, `sqlite://` for
/// development and tests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DurableStoreConfig {
    #[serde(default = "default_durable_store_url")]
    pub url: String,
    /// Service key / password supplied out-of-band from the URL.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Write-behind worker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Bounded queue capacity; enqueue on a full queue drops the write.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// How long shutdown waits for the queue to drain.
    #[serde(default = "default_shutdown_drain_seconds")]
    pub shutdown_drain_seconds: u64,
}

impl WriterConfig {
    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_seconds)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7788
}

fn default_env() -> String {
    "development".to_string()
}

fn default_cors_origins() -> String {
    "*".to_string()
}

fn default_shared_store_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_pubsub_channel() -> String {
    crate::DEFAULT_PUBSUB_CHANNEL.to_string()
}

fn default_op_timeout_ms() -> u64 {
    2000
}

fn default_durable_store_url() -> String {
    "sqlite://./data/tandem.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_queue_size() -> usize {
    1000
}

fn default_shutdown_drain_seconds() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            env: default_env(),
            debug: false,
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for SharedStoreConfig {
    fn default() -> Self {
        Self {
            url: default_shared_store_url(),
            pubsub_channel: default_pubsub_channel(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

impl Default for DurableStoreConfig {
    fn default() -> Self {
        Self {
            url: default_durable_store_url(),
            key: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            shutdown_drain_seconds: default_shutdown_drain_seconds(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Auth configuration (required; boot fails without a secret).
    pub auth: AuthConfig,
    #[serde(default)]
    pub shared_store: SharedStoreConfig,
    #[serde(default)]
    pub durable_store: DurableStoreConfig,
    #[serde(default)]
    pub writer: WriterConfig,
}

impl AppConfig {
    /// Validate invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth.secret.trim().is_empty() {
            return Err("auth.secret must not be empty".to_string());
        }
        if self.writer.queue_size == 0 {
            return Err("writer.queue_size must be at least 1".to_string());
        }
        if self.shared_store.op_timeout_ms == 0 {
            return Err("shared_store.op_timeout_ms must be at least 1".to_string());
        }
        if self.shared_store.pubsub_channel.trim().is_empty() {
            return Err("shared_store.pubsub_channel must not be empty".to_string());
        }
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses an in-memory SQLite durable store and a
    /// fixed auth secret.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig {
                secret: "test-secret".to_string(),
            },
            shared_store: SharedStoreConfig::default(),
            durable_store: DurableStoreConfig {
                url: "sqlite::memory:".to_string(),
                key: None,
                max_connections: 1,
            },
            writer: WriterConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::for_testing();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 7788);
        assert_eq!(config.shared_store.pubsub_channel, "todo:updates");
    }

    #[test]
    fn empty_secret_is_rejected() {
        let mut config = AppConfig::for_testing();
        config.auth.secret = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_queue_size_is_rejected() {
        let mut config = AppConfig::for_testing();
        config.writer.queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_sparse_input() {
        let json = r#"{"auth": {"secret": "s3cret"}, "server": {"port": 9000}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.writer.queue_size, 1000);
        assert_eq!(config.shared_store.op_timeout_ms, 2000);
    }
}
