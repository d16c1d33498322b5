//! Configuration module for Socksgate
//!
//! This module provides configuration types and parsing for every role the
//! binary can run: gateway, tunnel server and relay agent.

mod gateway;
mod transport;
mod tunnel;

pub use gateway::GatewayConfig;
pub use transport::{TcpConfig, TlsClientConfig, TlsServerConfig};
pub use tunnel::{AgentConfig, TunnelConfig};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// SOCKS5 gateway
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,

    /// Reverse tunnel server
    #[serde(default)]
    pub tunnel: Option<TunnelConfig>,

    /// Relay agent
    #[serde(default)]
    pub agent: Option<AgentConfig>,
}

impl Config {
    /// Validate every configured section
    pub fn validate(&self) -> Result<()> {
        if self.gateway.is_none() && self.tunnel.is_none() && self.agent.is_none() {
            bail!("At least one of [gateway], [tunnel] or [agent] must be configured");
        }
        if let Some(gateway) = &self.gateway {
            gateway.validate().map_err(anyhow::Error::msg)?;
        }
        if let Some(tunnel) = &self.tunnel {
            tunnel.validate().map_err(anyhow::Error::msg)?;
        }
        if let Some(agent) = &self.agent {
            agent.validate().map_err(anyhow::Error::msg)?;
        }
        if let (Some(gateway), Some(tunnel)) = (&self.gateway, &self.tunnel) {
            if gateway.listen_addr == tunnel.edge_addr {
                bail!("gateway listen_addr and tunnel edge_addr must differ");
            }
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config
        .validate()
        .with_context(|| "Invalid configuration")?;
    Ok(config)
}
