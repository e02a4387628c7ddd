// src/config.rs

//! Manages server configuration: loading, resolving defaults, and validation.

use crate::core::protocol::wire_message::{MAX_PAYLOAD_LEN, MAX_SENDER_LEN};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: u32,
    #[serde(default = "default_pool_size")]
    pool_size: usize,
    #[serde(default = "default_cache_capacity")]
    cache_capacity: usize,
    #[serde(default = "default_max_username_len")]
    max_username_len: usize,
    #[serde(default = "default_max_payload_len")]
    max_payload_len: usize,
    #[serde(default = "default_time_quantum_ms")]
    time_quantum_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    read_timeout_ms: u64,
    #[serde(default = "default_outbound_queue_len")]
    outbound_queue_len: usize,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> u32 {
    50
}
fn default_pool_size() -> usize {
    6
}
fn default_cache_capacity() -> usize {
    10
}
fn default_max_username_len() -> usize {
    MAX_SENDER_LEN
}
fn default_max_payload_len() -> usize {
    MAX_PAYLOAD_LEN
}
fn default_time_quantum_ms() -> u64 {
    100
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_outbound_queue_len() -> usize {
    64
}

/// Represents the final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Listen backlog for pending connections.
    pub max_clients: u32,
    /// Number of workers, i.e. the maximum number of simultaneously active sessions.
    pub pool_size: usize,
    pub cache_capacity: usize,
    pub max_username_len: usize,
    pub max_payload_len: usize,
    pub time_quantum_ms: u64,
    /// Bounds the identity handshake and the shutdown poll period of a session.
    pub read_timeout_ms: u64,
    /// Depth of each client's delivery queue.
    pub outbound_queue_len: usize,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            pool_size: default_pool_size(),
            cache_capacity: default_cache_capacity(),
            max_username_len: default_max_username_len(),
            max_payload_len: default_max_payload_len(),
            time_quantum_ms: default_time_quantum_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            outbound_queue_len: default_outbound_queue_len(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("Failed to parse TOML")?;

        let config = Config {
            host: raw.host,
            port: raw.port,
            log_level: raw.log_level,
            max_clients: raw.max_clients,
            pool_size: raw.pool_size,
            cache_capacity: raw.cache_capacity,
            max_username_len: raw.max_username_len,
            max_payload_len: raw.max_payload_len,
            time_quantum_ms: raw.time_quantum_ms,
            read_timeout_ms: raw.read_timeout_ms,
            outbound_queue_len: raw.outbound_queue_len,
            metrics: raw.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.pool_size == 0 {
            return Err(anyhow!("pool_size must be positive"));
        }
        if self.cache_capacity == 0 {
            return Err(anyhow!("cache_capacity must be positive"));
        }
        if self.time_quantum_ms == 0 {
            return Err(anyhow!("time_quantum_ms must be positive"));
        }
        if self.read_timeout_ms == 0 {
            return Err(anyhow!("read_timeout_ms must be positive"));
        }
        if self.outbound_queue_len == 0 {
            return Err(anyhow!("outbound_queue_len must be positive"));
        }
        if self.max_username_len == 0 || self.max_username_len > MAX_SENDER_LEN {
            return Err(anyhow!(
                "max_username_len must be between 1 and {MAX_SENDER_LEN}"
            ));
        }
        if self.max_payload_len == 0 || self.max_payload_len > MAX_PAYLOAD_LEN {
            return Err(anyhow!(
                "max_payload_len must be between 1 and {MAX_PAYLOAD_LEN}"
            ));
        }
        if self.metrics.enabled && self.metrics.port == self.port {
            return Err(anyhow!("metrics.port cannot equal the chat port"));
        }

        if self.pool_size > self.max_clients as usize {
            warn!(
                "pool_size ({}) exceeds max_clients ({}); the listen backlog will fill before the pool does.",
                self.pool_size, self.max_clients
            );
        }
        Ok(())
    }
}
