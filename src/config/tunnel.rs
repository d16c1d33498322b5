//! Tunnel configuration types
//!
//! Settings for the reverse tunnel server and for the relay agent.

use super::gateway::default_buffer_size;
use super::{TcpConfig, TlsClientConfig, TlsServerConfig};
use crate::helper::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_edge_addr() -> String {
    "0.0.0.0:1080".to_string()
}

fn default_intercept_addr() -> String {
    "127.0.0.1:12345".to_string()
}

/// Default initial reconnect delay in milliseconds
fn default_retry_initial_ms() -> u64 {
    500
}

/// Default maximum reconnect delay in seconds
fn default_retry_max_secs() -> u64 {
    30
}

/// Reverse tunnel server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TunnelConfig {
    /// TLS listener that agents connect to
    #[serde(default = "default_edge_addr")]
    pub edge_addr: String,

    /// Plain listener receiving redirected outbound connections
    #[serde(default = "default_intercept_addr")]
    pub intercept_addr: String,

    /// Pipe authentication secret
    pub secret: String,

    /// Edge listener certificate and key
    pub tls: TlsServerConfig,

    /// Upper bound on concurrently bridged connections, 0 for unbounded
    #[serde(default)]
    pub max_connections: usize,

    /// Relay buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Socket options for accepted agent connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl TunnelConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        validate_secret(&self.secret)?;
        if self.edge_addr == self.intercept_addr {
            return Err("edge_addr and intercept_addr must differ".to_string());
        }
        if self.buffer_size == 0 {
            return Err("buffer_size must be greater than 0".to_string());
        }
        self.tls.validate()
    }
}

/// Relay agent configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentConfig {
    /// Tunnel server edge address
    pub remote_addr: String,

    /// Pipe authentication secret
    pub secret: String,

    /// TLS settings for the edge connection
    #[serde(default)]
    pub tls: TlsClientConfig,

    /// Relay buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Socket options for the edge connection and dialed targets
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Reconnect attempts before giving up, 0 for unlimited
    #[serde(default)]
    pub max_retries: u32,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    /// Reconnect delay cap in seconds
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,
}

impl AgentConfig {
    /// Reconnect backoff derived from the retry settings
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_initial_ms),
            max_delay: Duration::from_secs(self.retry_max_secs),
            multiplier: 2.0,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.remote_addr.trim().is_empty() {
            return Err("agent remote_addr cannot be empty".to_string());
        }
        validate_secret(&self.secret)?;
        if self.buffer_size == 0 {
            return Err("buffer_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn validate_secret(secret: &str) -> Result<(), String> {
    if secret.is_empty() {
        return Err("secret cannot be empty".to_string());
    }
    if secret.len() > u8::MAX as usize {
        return Err("secret cannot be longer than 255 bytes".to_string());
    }
    Ok(())
}
