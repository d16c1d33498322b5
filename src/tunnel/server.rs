//! Reverse tunnel server
//!
//! Two listeners share one [`SessionRegistry`]:
//!
//! - the edge listener accepts agents over TLS, checks the shared secret and
//!   registers each multiplexed session under a virtual address;
//! - the intercept listener accepts redirected connections and hands them to
//!   the [`TunnelBridge`].

use super::bridge::TunnelBridge;
use super::pipe_auth::pipe_check;
use super::registry::SessionRegistry;
use super::session::{MuxSession, YamuxSession};
use crate::config::TunnelConfig;
use crate::helper::ConnectionLimit;
use crate::pool::{BufferPool, DEFAULT_POOL_CAPACITY};
use crate::transport::{load_acceptor, DestinationResolver, OriginalDst, SocketOpts};
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Reverse tunnel server
pub struct TunnelServer {
    config: TunnelConfig,
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn DestinationResolver>,
}

impl TunnelServer {
    /// Create a server resolving destinations with `SO_ORIGINAL_DST`
    pub fn new(config: TunnelConfig) -> Self {
        TunnelServer {
            config,
            registry: Arc::new(SessionRegistry::new()),
            resolver: Arc::new(OriginalDst),
        }
    }

    /// Replace the destination resolver used by the intercept listener
    pub fn with_resolver<R: DestinationResolver>(mut self, resolver: R) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Registry shared by both listeners
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind both listeners and serve until shutdown
    pub async fn run(self, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let edge = TcpListener::bind(&self.config.edge_addr)
            .await
            .with_context(|| format!("Failed to bind edge listener on {}", self.config.edge_addr))?;
        let intercept = TcpListener::bind(&self.config.intercept_addr)
            .await
            .with_context(|| {
                format!(
                    "Failed to bind intercept listener on {}",
                    self.config.intercept_addr
                )
            })?;

        info!("Tunnel edge listening on {}", edge.local_addr()?);
        info!("Tunnel intercept listening on {}", intercept.local_addr()?);

        let acceptor = load_acceptor(&self.config.tls).with_context(|| "Failed to load edge TLS")?;
        self.serve(edge, Some(acceptor), intercept, shutdown_rx).await
    }

    /// Serve on already bound listeners
    ///
    /// Without an acceptor the edge listener speaks plain TCP.
    pub async fn serve(
        self,
        edge: TcpListener,
        acceptor: Option<TlsAcceptor>,
        intercept: TcpListener,
        shutdown_rx: broadcast::Receiver<bool>,
    ) -> Result<()> {
        let socket_opts = SocketOpts::from_tcp_config(&self.config.tcp);
        let pool = BufferPool::new(DEFAULT_POOL_CAPACITY, self.config.buffer_size);
        let bridge = TunnelBridge::new(Arc::clone(&self.registry), pool);
        let limit = ConnectionLimit::new(self.config.max_connections);
        let secret: Arc<[u8]> = Arc::from(self.config.secret.as_bytes());

        let edge_loop = serve_edge(
            edge,
            acceptor,
            secret,
            Arc::clone(&self.registry),
            socket_opts,
            shutdown_rx.resubscribe(),
        );
        let intercept_loop = serve_intercept(
            intercept,
            bridge,
            Arc::clone(&self.resolver),
            limit,
            shutdown_rx,
        );

        tokio::join!(edge_loop, intercept_loop);
        info!("Tunnel server stopped");
        Ok(())
    }
}

/// Run the tunnel server until shutdown
pub async fn run_tunnel(config: TunnelConfig, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    TunnelServer::new(config).run(shutdown_rx).await
}

async fn serve_edge(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    secret: Arc<[u8]>,
    registry: Arc<SessionRegistry>,
    socket_opts: SocketOpts,
    mut shutdown_rx: broadcast::Receiver<bool>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Edge accept error: {}", e);
                    continue;
                }
            },
            _ = shutdown_rx.recv() => break,
        };

        debug!("Accepted agent connection from {}", peer);
        socket_opts.hint(&stream);

        let acceptor = acceptor.clone();
        let secret = Arc::clone(&secret);
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let result = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve_agent(tls_stream, peer, &secret, &registry).await,
                    Err(e) => Err(e).with_context(|| "TLS handshake failed"),
                },
                None => serve_agent(stream, peer, &secret, &registry).await,
            };
            if let Err(e) = result {
                warn!("Agent {} failed: {:#}", peer, e);
            }
        });
    }
}

async fn serve_intercept(
    listener: TcpListener,
    bridge: TunnelBridge,
    resolver: Arc<dyn DestinationResolver>,
    limit: ConnectionLimit,
    mut shutdown_rx: broadcast::Receiver<bool>,
) {
    loop {
        let permit = tokio::select! {
            permit = limit.acquire() => permit,
            _ = shutdown_rx.recv() => break,
        };

        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Intercept accept error: {}", e);
                    continue;
                }
            },
            _ = shutdown_rx.recv() => break,
        };

        let dest = match resolver.resolve(&stream) {
            Ok(dest) => dest,
            Err(e) => {
                warn!("No original destination for {}: {}", peer, e);
                continue;
            }
        };
        debug!("Intercepted {} -> {}", peer, dest);

        let bridge = bridge.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = bridge.handle(stream, dest).await {
                debug!("Intercepted connection {} -> {} dropped: {:#}", peer, dest, e);
            }
        });
    }
}

/// Serve one agent connection until its session closes
///
/// Checks the shared secret, starts a server-mode session and registers it
/// under the lowest free virtual address. The address is released once the
/// session is observed closed. Returns the address the agent held.
pub async fn serve_agent<S>(
    mut stream: S,
    peer: SocketAddr,
    secret: &[u8],
    registry: &SessionRegistry,
) -> Result<Ipv4Addr>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pipe_check(&mut stream, secret)
        .await
        .with_context(|| format!("Pipe authentication with {} failed", peer))?;

    let session = Arc::new(YamuxSession::server(stream).with_peer(peer));
    let addr = match registry.allocate_and_register(session.clone()).await {
        Ok(addr) => addr,
        Err(e) => {
            session.close().await;
            return Err(e).with_context(|| format!("Cannot register agent {}", peer));
        }
    };

    info!("Agent {} registered as {}", peer, addr);
    registry.dump().await;

    while let Some(stream) = session.accept().await {
        tokio::spawn(drain_stream(stream, addr));
    }
    session.closed().await;

    registry.unregister(addr).await;
    info!("Agent {} at {} disconnected", peer, addr);
    registry.dump().await;

    Ok(addr)
}

/// Log whatever an agent sends on a stream it opened
async fn drain_stream<S>(mut stream: S, addr: Ipv4Addr)
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => debug!("Agent {} sent {} bytes on an inbound stream", addr, n),
            Err(e) => {
                debug!("Inbound stream from {} ended: {}", addr, e);
                break;
            }
        }
    }
}
