use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::client::backoff::BackoffPolicy;
use crate::client::transport::TransportConfig;
use crate::models::PeerRole;
use crate::services::ingest_service::IngestConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Relay URL advertised in pairing payloads
    pub public_url: Option<String>,

    // Relay server
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_max_peers_per_session")]
    pub max_peers_per_session: usize,
    /// Reject joins to sessions that were not issued by this server
    #[serde(default)]
    pub strict_sessions: bool,
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    // Relay client
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_factor")]
    pub reconnect_factor: f64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    // Ingest
    #[serde(default = "default_delivery_retry_ms")]
    pub delivery_retry_ms: u64,
    #[serde(default = "default_delivery_retry_max_ms")]
    pub delivery_retry_max_ms: u64,
    #[serde(default = "default_delivery_max_attempts")]
    pub delivery_max_attempts: u32,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                config.validate()?;
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Relay URL handed to the responder device
    pub fn relay_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.clone(),
            None => format!("ws://{}:{}/ws", self.host, self.port),
        }
    }

    /// Parsed CORS origins, empty when none are configured
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Reject values the relay client cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("HEARTBEAT_INTERVAL_MS", self.heartbeat_interval_ms),
            ("CONNECT_TIMEOUT_MS", self.connect_timeout_ms),
            ("ACK_TIMEOUT_MS", self.ack_timeout_ms),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, value)| *value == 0) {
            error!("❌ {} must be greater than zero", name);
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Reconnect policy for the client transport
    pub fn reconnect_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            factor: self.reconnect_factor,
            max: Duration::from_millis(self.reconnect_max_ms),
            max_attempts: self.reconnect_max_attempts,
        }
    }

    /// Client transport configuration for the given relay URL and role
    pub fn transport_config(&self, url: impl Into<String>, role: PeerRole) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            reconnect: self.reconnect_policy(),
            ..TransportConfig::new(url, role)
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            retry: BackoffPolicy {
                base: Duration::from_millis(self.delivery_retry_ms),
                factor: self.reconnect_factor,
                max: Duration::from_millis(self.delivery_retry_max_ms),
                max_attempts: self.delivery_max_attempts,
            },
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            cors_origins: None,
            log_level: default_log_level(),
            service_name: default_service_name(),
            public_url: None,
            session_ttl_secs: default_session_ttl_secs(),
            max_peers_per_session: default_max_peers_per_session(),
            strict_sessions: false,
            outbound_buffer: default_outbound_buffer(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_factor: default_reconnect_factor(),
            reconnect_max_ms: default_reconnect_max_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            delivery_retry_ms: default_delivery_retry_ms(),
            delivery_retry_max_ms: default_delivery_retry_max_ms(),
            delivery_max_attempts: default_delivery_max_attempts(),
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "docuninja-relay".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_session_ttl_secs() -> u64 {
    600
}

fn default_max_peers_per_session() -> usize {
    2
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_reconnect_base_ms() -> u64 {
    2_000
}

fn default_reconnect_factor() -> f64 {
    1.5
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_delivery_retry_ms() -> u64 {
    3_000
}

fn default_delivery_retry_max_ms() -> u64 {
    30_000
}

fn default_delivery_max_attempts() -> u32 {
    5
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = Config::default();
        let policy = config.reconnect_policy();
        assert_eq!(policy.base, Duration::from_millis(2_000));
        assert_eq!(policy.max, Duration::from_millis(30_000));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(config.ingest_config().retry.base, Duration::from_millis(3_000));
    }

    #[test]
    fn test_relay_url_prefers_public_url() {
        let mut config = Config::default();
        assert_eq!(config.relay_url(), "ws://0.0.0.0:3000/ws");

        config.public_url = Some("wss://relay.example.com/ws".to_string());
        assert_eq!(config.relay_url(), "wss://relay.example.com/ws");
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        assert!(Config::default().validate().is_ok());

        let config = Config { heartbeat_interval_ms: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("HEARTBEAT_INTERVAL_MS")));

        let config = Config { connect_timeout_ms: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_cors_origin_list_skips_blanks() {
        let config = Config {
            cors_origins: Some("https://a.example, ,https://b.example".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.cors_origin_list(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
