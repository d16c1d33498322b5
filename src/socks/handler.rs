//! Main gateway connection handler
//!
//! This module provides the entry point for a client connection accepted by
//! the gateway listener. It runs the protocol engine and dispatches the
//! parsed request.

use crate::config::GatewayConfig;
use crate::pool::{BufferPool, DEFAULT_POOL_CAPACITY};
use crate::socks::connect::handle_connect;
use crate::socks::gateway_state::handle_gateway_state;
use crate::socks::handshake::{ProtocolEngine, TokenPolicy};
use crate::socks::reply::synthetic_reply;
use crate::socks::types::Command;
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Shared state for every connection of one gateway listener
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// Token check applied during authentication
    pub policy: TokenPolicy,
    /// Options for dialed destinations
    pub socket_opts: SocketOpts,
    /// Relay buffers
    pub pool: BufferPool,
}

impl GatewayContext {
    /// Build the context for a gateway configuration
    pub fn from_config(config: &GatewayConfig) -> Self {
        GatewayContext {
            policy: config.token_policy(),
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
            pool: BufferPool::new(DEFAULT_POOL_CAPACITY, config.buffer_size),
        }
    }
}

/// Handle one gateway client connection
///
/// # Protocol Flow
///
/// 1. Method negotiation (token method only)
/// 2. Token authentication
/// 3. Request parsing, including the optional extension
/// 4. Dispatch: CONNECT, gateway state, or the synthetic reply for anything
///    else
pub async fn handle_gateway_connection<S>(mut stream: S, ctx: &GatewayContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut engine = ProtocolEngine::new(ctx.policy.clone());

    engine
        .handshake(&mut stream)
        .await
        .with_context(|| "Method negotiation failed")?;

    let credential = engine
        .authenticate(&mut stream)
        .await
        .with_context(|| "Token authentication failed")?;

    let request = engine
        .read_request(&mut stream)
        .await
        .with_context(|| "Failed to parse connection request")?;

    info!(
        "SOCKS5 {} request to {} (resource {})",
        request.command,
        request.address,
        String::from_utf8_lossy(&credential.resource_id)
    );
    if let Some(extension) = &request.extension {
        debug!(
            "Client metadata v{}: ip={} process={} os={}",
            extension.version,
            extension.data.client_ip,
            extension.data.process_name,
            extension.data.os
        );
    }

    engine.dispatched();
    let address_type = request.address.address_type();

    match request.command {
        Command::Connect => {
            // The relay owns and closes the stream, so nothing follows it.
            let result =
                handle_connect(stream, &request.address, &ctx.socket_opts, &ctx.pool).await;
            engine.close();
            return result;
        }
        Command::GatewayState => {
            if let Err(e) = handle_gateway_state(&mut stream).await {
                debug!("Gateway state session ended: {}", e);
            }
            let _ = synthetic_reply(&mut stream, address_type).await;
        }
        other => {
            warn!("{} command not supported", other);
            synthetic_reply(&mut stream, address_type)
                .await
                .with_context(|| "Failed to send reply")?;
        }
    }

    engine.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::consts::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn preamble(token: &[u8]) -> Vec<u8> {
        let mut data = vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_TOKEN];
        data.push(SOCKS5_AUTH_METHOD_TOKEN);
        data.push(token.len() as u8);
        data.extend_from_slice(token);
        data.push(3);
        data.extend_from_slice(b"res");
        data
    }

    #[tokio::test]
    async fn test_unsupported_command_gets_synthetic_reply() {
        let (mut client, server) = duplex(1024);
        let ctx = GatewayContext::from_config(&GatewayConfig::default());

        let handle = tokio::spawn(async move { handle_gateway_connection(server, &ctx).await });

        let mut data = preamble(b"tok");
        data.extend_from_slice(&[5, SOCKS5_CMD_TCP_BIND, 0, 3, 1, b'h', 0, 80, 0, 0]);
        client.write_all(&data).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(
            reply,
            vec![5, 0x80, 0x80, 0x00, 5, 0, 0, 3, 0, 0, 0, 0, 0, 0]
        );
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bad_version_closes_after_rejection() {
        let (mut client, server) = duplex(1024);
        let ctx = GatewayContext::from_config(&GatewayConfig::default());

        let handle = tokio::spawn(async move { handle_gateway_connection(server, &ctx).await });

        client.write_all(&[4, 1, 0]).await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, vec![5, 0xFF]);
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_required_token_rejected() {
        let (mut client, server) = duplex(1024);
        let config = GatewayConfig {
            require_token: true,
            token: Some("good".to_string()),
            ..Default::default()
        };
        let ctx = GatewayContext::from_config(&config);

        let handle = tokio::spawn(async move { handle_gateway_connection(server, &ctx).await });

        client.write_all(&preamble(b"bad")).await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, vec![5, 0x80, 0x80, 0x01]);
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_malformed_extension_is_fatal() {
        let (mut client, server) = duplex(1024);
        let ctx = GatewayContext::from_config(&GatewayConfig::default());

        let handle = tokio::spawn(async move { handle_gateway_connection(server, &ctx).await });

        let mut data = preamble(b"tok");
        data.extend_from_slice(&[5, SOCKS5_CMD_TCP_CONNECT, 0, 1, 127, 0, 0, 1, 0, 80, 0, 4]);
        data.extend_from_slice(b"@@@@");
        client.write_all(&data).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        // Only the negotiation and auth replies; no dial was attempted.
        assert_eq!(reply, vec![5, 0x80, 0x80, 0x00]);
        assert!(handle.await.unwrap().is_err());
    }
}
