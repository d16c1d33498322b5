//! Bridges intercepted connections into agent sessions

use super::registry::SessionRegistry;
use crate::error::TunnelError;
use crate::pool::BufferPool;
use crate::relay::relay;
use crate::socks::{connect_no_auth, Address};
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Routes a redirected connection to the agent owning its destination
#[derive(Clone)]
pub struct TunnelBridge {
    registry: Arc<SessionRegistry>,
    pool: BufferPool,
}

impl TunnelBridge {
    /// Create a bridge over `registry`
    pub fn new(registry: Arc<SessionRegistry>, pool: BufferPool) -> Self {
        TunnelBridge { registry, pool }
    }

    /// Carry `local` to `dest` through the owning agent
    ///
    /// The destination address selects the session; the agent then connects
    /// to `127.0.0.1:<port>` on its side. No stream is opened when no session
    /// owns the address.
    pub async fn handle<S>(&self, local: S, dest: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ip = match dest.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => return Err(TunnelError::Unroutable(dest).into()),
        };

        let session = self
            .registry
            .lookup(ip)
            .await
            .ok_or(TunnelError::NoSession(ip))?;

        let mut stream = session
            .open()
            .await
            .with_context(|| format!("Failed to open stream to {}", ip))?;

        let target = Address::ipv4(Ipv4Addr::LOCALHOST, dest.port());
        connect_no_auth(&mut stream, &target)
            .await
            .with_context(|| format!("Agent {} refused CONNECT to {}", ip, target))?;

        info!("Bridged {} through agent {}", target, ip);

        if let Err(e) = relay(local, stream, &self.pool).await {
            debug!("Bridge relay for {} ended with error: {}", dest, e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::serve_no_auth;
    use crate::tunnel::session::MuxSession;
    use crate::transport::{BoxStream, SocketOpts};
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Session whose streams are served by an in-process no-auth responder
    #[derive(Default)]
    struct LoopbackSession {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl MuxSession for LoopbackSession {
        async fn open(&self) -> io::Result<BoxStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let (near, far) = duplex(64 * 1024);
            tokio::spawn(async move {
                let pool = BufferPool::new(2, 1024);
                let _ = serve_no_auth(far, &SocketOpts::default(), &pool).await;
            });
            Ok(Box::new(near))
        }
        async fn accept(&self) -> Option<BoxStream> {
            None
        }
        async fn close(&self) {}
        fn is_closed(&self) -> bool {
            false
        }
        async fn closed(&self) {}
    }

    #[tokio::test]
    async fn test_no_session_opens_nothing() {
        let registry = Arc::new(SessionRegistry::new());
        let session = Arc::new(LoopbackSession::default());
        registry
            .register(Ipv4Addr::new(10, 0, 0, 1), session.clone())
            .await
            .unwrap();

        let bridge = TunnelBridge::new(registry, BufferPool::new(2, 1024));
        let (local, _peer) = duplex(1024);
        let err = bridge
            .handle(local, "10.0.0.2:80".parse().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TunnelError>(),
            Some(TunnelError::NoSession(ip)) if *ip == Ipv4Addr::new(10, 0, 0, 2)
        ));
        assert_eq!(session.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ipv6_unroutable() {
        let bridge = TunnelBridge::new(Arc::new(SessionRegistry::new()), BufferPool::default());
        let (local, _peer) = duplex(1024);
        let err = bridge
            .handle(local, "[::1]:80".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TunnelError>(),
            Some(TunnelError::Unroutable(_))
        ));
    }

    #[tokio::test]
    async fn test_bridge_relays_to_agent_local_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let registry = Arc::new(SessionRegistry::new());
        let session = Arc::new(LoopbackSession::default());
        let ip = registry.allocate_and_register(session.clone()).await.unwrap();

        let bridge = TunnelBridge::new(registry, BufferPool::new(2, 1024));
        let (local, mut client) = duplex(1024);
        let dest = SocketAddr::new(IpAddr::V4(ip), port);
        let handle = tokio::spawn(async move { bridge.handle(local, dest).await });

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(client);
        handle.await.unwrap().unwrap();
        assert_eq!(session.opens.load(Ordering::SeqCst), 1);
    }
}
