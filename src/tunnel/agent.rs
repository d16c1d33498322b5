//! Relay agent
//!
//! Connects back to the tunnel server, authenticates with the shared secret
//! and serves a no-auth SOCKS5 responder on every stream the server opens.

use super::pipe_auth::pipe_auth;
use super::session::{MuxSession, YamuxSession};
use crate::config::AgentConfig;
use crate::pool::{BufferPool, DEFAULT_POOL_CAPACITY};
use crate::socks::serve_no_auth;
use crate::transport::{dial_addr, server_name, tls_connector, SocketOpts};
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Run the agent until shutdown, reconnecting when the session drops
pub async fn run_agent(config: AgentConfig, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    info!("Starting relay agent");
    info!("Tunnel server: {}", config.remote_addr);

    let retry = config.retry();
    let socket_opts = SocketOpts::from_tcp_config(&config.tcp);
    let pool = BufferPool::new(DEFAULT_POOL_CAPACITY, config.buffer_size);
    let mut attempt = 0;

    loop {
        let outcome = tokio::select! {
            outcome = run_once(&config, &socket_opts, &pool) => outcome,
            _ = shutdown_rx.recv() => break,
        };

        let delay = match outcome {
            Ok(served) => {
                attempt = 0;
                info!(
                    "Tunnel session closed after {} streams. Reconnecting in {:?}...",
                    served, retry.initial_delay
                );
                retry.initial_delay
            }
            Err(e) => {
                if !retry.should_retry(attempt) {
                    error!("Max retries exceeded, giving up");
                    return Err(e);
                }
                let delay = retry.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    "Tunnel error: {:#}. Reconnecting in {:?}... (attempt {})",
                    e, delay, attempt
                );
                delay
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    info!("Relay agent stopped");
    Ok(())
}

async fn run_once(config: &AgentConfig, socket_opts: &SocketOpts, pool: &BufferPool) -> Result<usize> {
    let connector = tls_connector(&config.tls)?;
    let domain = server_name(&config.tls, &config.remote_addr)?;

    let tcp = dial_addr(&config.remote_addr, socket_opts)
        .await
        .with_context(|| format!("Failed to connect to {}", config.remote_addr))?;
    let tls = connector
        .connect(domain, tcp)
        .await
        .with_context(|| "TLS handshake failed")?;

    serve_agent_session(tls, config.secret.as_bytes(), socket_opts, pool).await
}

/// Authenticate on `stream` and serve streams until the session closes
///
/// Returns how many streams were served.
pub async fn serve_agent_session<S>(
    mut stream: S,
    secret: &[u8],
    socket_opts: &SocketOpts,
    pool: &BufferPool,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pipe_auth(&mut stream, secret)
        .await
        .with_context(|| "Pipe authentication failed")?;

    let session = YamuxSession::client(stream);
    info!("Tunnel session established, waiting for streams");

    let mut served = 0;
    while let Some(stream) = session.accept().await {
        served += 1;
        debug!("New tunnel stream");

        let socket_opts = socket_opts.clone();
        let pool = pool.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_no_auth(stream, &socket_opts, &pool).await {
                warn!("Tunnel stream failed: {:#}", e);
            }
        });
    }

    Ok(served)
}
