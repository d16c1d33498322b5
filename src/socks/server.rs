//! Gateway listener
//!
//! Accepts client connections, optionally wraps them in TLS and runs one
//! handler task per connection.

use crate::config::GatewayConfig;
use crate::helper::ConnectionLimit;
use crate::socks::handler::{handle_gateway_connection, GatewayContext};
use crate::transport::load_acceptor;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Run the gateway until shutdown
pub async fn run_gateway(config: GatewayConfig, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind gateway on {}", config.listen_addr))?;

    info!("Gateway listening on {}", listener.local_addr()?);

    serve_gateway(listener, config, shutdown_rx).await
}

/// Serve gateway clients on an already bound listener
pub async fn serve_gateway(
    listener: TcpListener,
    config: GatewayConfig,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> Result<()> {
    let acceptor = match &config.tls {
        Some(tls) => Some(load_acceptor(tls).with_context(|| "Failed to load gateway TLS")?),
        None => None,
    };
    let ctx = Arc::new(GatewayContext::from_config(&config));
    let limit = ConnectionLimit::new(config.max_connections);

    loop {
        let permit = tokio::select! {
            permit = limit.acquire() => permit,
            _ = shutdown_rx.recv() => break,
        };

        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Gateway accept error: {}", e);
                    continue;
                }
            },
            _ = shutdown_rx.recv() => break,
        };

        debug!("Accepted gateway connection from {}", peer);
        ctx.socket_opts.hint(&stream);

        let ctx = Arc::clone(&ctx);
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let result = match acceptor {
                Some(acceptor) => serve_tls(acceptor, stream, &ctx).await,
                None => handle_gateway_connection(stream, &ctx).await,
            };
            if let Err(e) = result {
                warn!("Gateway connection from {} failed: {:#}", peer, e);
            }
        });
    }

    info!("Gateway stopped");
    Ok(())
}

async fn serve_tls(
    acceptor: TlsAcceptor,
    stream: tokio::net::TcpStream,
    ctx: &GatewayContext,
) -> Result<()> {
    let tls_stream = acceptor
        .accept(stream)
        .await
        .with_context(|| "TLS handshake failed")?;
    handle_gateway_connection(tls_stream, ctx).await
}
