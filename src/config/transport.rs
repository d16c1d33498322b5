//! Transport configuration types
//!
//! Socket options and TLS settings shared by every role.

use serde::{Deserialize, Serialize};

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

fn default_nodelay() -> bool {
    true
}

/// TCP socket configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

/// TLS settings for a dialing side
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TlsClientConfig {
    /// Server name presented in SNI and checked against the certificate
    #[serde(default)]
    pub hostname: Option<String>,

    /// Extra PEM root certificate to trust
    #[serde(default)]
    pub trusted_root: Option<String>,

    /// Accept any server certificate
    #[serde(default)]
    pub skip_verify: bool,
}

/// TLS settings for a listening side
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TlsServerConfig {
    /// PEM certificate chain
    pub cert: String,

    /// PEM private key
    pub key: String,
}

impl TlsServerConfig {
    /// Check that both paths are set
    pub fn validate(&self) -> Result<(), String> {
        if self.cert.trim().is_empty() {
            return Err("TLS certificate path cannot be empty".to_string());
        }
        if self.key.trim().is_empty() {
            return Err("TLS key path cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert!(config.nodelay);
        assert_eq!(config.keepalive_secs, 20);
        assert_eq!(config.keepalive_interval, 8);
    }

    #[test]
    fn test_tcp_config_partial() {
        let config: TcpConfig = toml::from_str("keepalive_secs = 60").unwrap();
        assert!(config.nodelay);
        assert_eq!(config.keepalive_secs, 60);
        assert_eq!(config.keepalive_interval, 8);
    }

    #[test]
    fn test_tls_client_config_default() {
        let config = TlsClientConfig::default();
        assert!(config.hostname.is_none());
        assert!(config.trusted_root.is_none());
        assert!(!config.skip_verify);
    }

    #[test]
    fn test_tls_server_config_validate() {
        let config = TlsServerConfig {
            cert: "cert.pem".to_string(),
            key: "key.pem".to_string(),
        };
        assert!(config.validate().is_ok());

        let config = TlsServerConfig {
            cert: "".to_string(),
            key: "key.pem".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
