//! # Socksgate - Token SOCKS5 Gateway and Reverse Tunnel
//!
//! Socksgate bundles three roles that can run from one binary:
//!
//! - **Gateway**: a SOCKS5 server that authenticates clients with a token
//!   method (`0x80`), accepts an optional JSON extension on each request and
//!   serves CONNECT plus a small gateway-state query protocol.
//! - **Tunnel server**: accepts relay agents over TLS, gives each one a
//!   virtual address in `10.0.0.0/24`, and forwards connections redirected
//!   to that address through the agent's multiplexed session.
//! - **Agent**: connects back to the tunnel server and completes every
//!   forwarded connection with a no-auth SOCKS5 CONNECT on its own side.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksgate::config::load_config;
//! use socksgate::socks::run_gateway;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_gateway(config.gateway.unwrap(), shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 client -> Gateway -> Target
//! Local app -> Tunnel server -> (yamux) -> Agent -> 127.0.0.1:port
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod pool;
pub mod relay;
pub mod socks;
pub mod transport;
pub mod tunnel;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{GatewayError, Socks5Error, TunnelError};
pub use socks::run_gateway;
pub use tunnel::{run_agent, run_tunnel};

/// Version of the Socksgate library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
