//! Configuration management for the plastics back office
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with RJB_ prefix

use std::net::{IpAddr, SocketAddr};

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Bearer token verification
    pub jwt: JwtConfig,

    /// Carton barcode settings
    pub barcode: BarcodeConfig,

    /// Purchase-order extraction service
    pub extraction: ExtractionConfig,

    /// Inbox monitor
    pub inbox: InboxConfig,

    /// Generated paperwork
    pub documents: DocumentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Shared secret the identity provider signs tokens with
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BarcodeConfig {
    /// First segment of every carton barcode
    pub prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Extraction API endpoint
    pub endpoint: String,

    /// Extraction API key
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InboxConfig {
    /// Seconds between polls when healthy
    pub poll_interval_secs: u64,

    /// Backoff ceiling after repeated failures
    pub max_backoff_secs: u64,

    /// Start polling when the server boots
    pub autostart: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Name printed in document headers
    pub company_name: String,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("RJB_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("barcode.prefix", shared::DEFAULT_BARCODE_PREFIX)?
            .set_default("extraction.endpoint", "")?
            .set_default("extraction.api_key", "")?
            .set_default("extraction.timeout_secs", 60)?
            .set_default("inbox.poll_interval_secs", 60)?
            .set_default("inbox.max_backoff_secs", 300)?
            .set_default("inbox.autostart", false)?
            .set_default("documents.company_name", "RAMJET PLASTICS")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (RJB_ prefix)
            .add_source(
                Environment::with_prefix("RJB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl ServerConfig {
    /// Address to bind; `localhost` resolves to the IPv4 loopback
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let host = self.host.trim();
        let ip: IpAddr = if host.eq_ignore_ascii_case("localhost") {
            IpAddr::from([127, 0, 0, 1])
        } else {
            host
                .parse::<IpAddr>()
                .map_err(|e| anyhow::anyhow!("Invalid server.host '{}': {}", host, e))?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr_uses_host() {
        let server = ServerConfig {
            port: 8080,
            host: "127.0.0.1".to_string(),
        };
        assert_eq!(server.socket_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());

        let default = ServerConfig::default();
        assert_eq!(default.socket_addr().unwrap(), "0.0.0.0:3000".parse().unwrap());
    }

    #[test]
    fn test_socket_addr_rejects_bad_host() {
        let server = ServerConfig {
            port: 8080,
            host: "not a host".to_string(),
        };
        assert!(server.socket_addr().is_err());
    }
}
