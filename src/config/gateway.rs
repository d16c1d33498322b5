//! Gateway configuration types
//!
//! Settings for the token-authenticated SOCKS5 listener.

use super::{TcpConfig, TlsServerConfig};
use crate::pool::DEFAULT_BUFFER_SIZE;
use crate::socks::TokenPolicy;
use serde::{Deserialize, Serialize};

/// Default gateway listen address
fn default_listen_addr() -> String {
    "0.0.0.0:1080".to_string()
}

/// Default relay buffer size
pub(crate) fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// SOCKS5 gateway configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Reject clients whose token differs from `token`
    #[serde(default)]
    pub require_token: bool,

    /// Expected token
    #[serde(default)]
    pub token: Option<String>,

    /// Upper bound on concurrently served connections, 0 for unbounded
    #[serde(default)]
    pub max_connections: usize,

    /// Relay buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Wrap accepted connections in TLS
    #[serde(default)]
    pub tls: Option<TlsServerConfig>,

    /// Socket options for dialed destinations
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            listen_addr: default_listen_addr(),
            require_token: false,
            token: None,
            max_connections: 0,
            buffer_size: default_buffer_size(),
            tls: None,
            tcp: TcpConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// How tokens are checked during authentication
    pub fn token_policy(&self) -> TokenPolicy {
        match (&self.token, self.require_token) {
            (Some(token), true) => TokenPolicy::Require(token.as_bytes().to_vec()),
            _ => TokenPolicy::AcceptAny,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.trim().is_empty() {
            return Err("gateway listen_addr cannot be empty".to_string());
        }
        if self.require_token {
            match &self.token {
                None => return Err("require_token is set but no token configured".to_string()),
                Some(token) if token.len() > u8::MAX as usize => {
                    return Err("token cannot be longer than 255 bytes".to_string())
                }
                Some(_) => {}
            }
        }
        if self.buffer_size == 0 {
            return Err("buffer_size must be greater than 0".to_string());
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        Ok(())
    }
}
