//! Session registry and virtual address allocation
//!
//! Maps each connected agent to a virtual IPv4 address in `10.0.0.0/24`.
//! Every operation runs inside one critical section, so allocation plus
//! registration can never hand the same address to two agents.

use super::session::MuxSession;
use crate::error::TunnelError;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// First host octet handed out
const FIRST_HOST: u8 = 1;
/// Last host octet handed out
const LAST_HOST: u8 = 254;

/// Build the virtual address for a host octet
fn virtual_address(host: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, host)
}

/// Live agent sessions keyed by virtual address
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<BTreeMap<Ipv4Addr, Arc<dyn MuxSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest free virtual address
    ///
    /// The address is not reserved; use [`allocate_and_register`] when the
    /// caller intends to register it.
    ///
    /// [`allocate_and_register`]: SessionRegistry::allocate_and_register
    pub async fn allocate(&self) -> Result<Ipv4Addr, TunnelError> {
        let sessions = self.sessions.lock().await;
        first_free(&sessions)
    }

    /// Register a session under a specific address
    pub async fn register(
        &self,
        addr: Ipv4Addr,
        session: Arc<dyn MuxSession>,
    ) -> Result<(), TunnelError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&addr) {
            return Err(TunnelError::AlreadyRegistered(addr));
        }
        sessions.insert(addr, session);
        debug!("Registered session at {} ({} live)", addr, sessions.len());
        Ok(())
    }

    /// Allocate the lowest free address and register `session` under it
    pub async fn allocate_and_register(
        &self,
        session: Arc<dyn MuxSession>,
    ) -> Result<Ipv4Addr, TunnelError> {
        let mut sessions = self.sessions.lock().await;
        let addr = first_free(&sessions)?;
        sessions.insert(addr, session);
        debug!("Registered session at {} ({} live)", addr, sessions.len());
        Ok(addr)
    }

    /// Session registered under `addr`
    pub async fn lookup(&self, addr: Ipv4Addr) -> Option<Arc<dyn MuxSession>> {
        self.sessions.lock().await.get(&addr).cloned()
    }

    /// Remove the session registered under `addr`
    pub async fn unregister(&self, addr: Ipv4Addr) -> Option<Arc<dyn MuxSession>> {
        let mut sessions = self.sessions.lock().await;
        let removed = sessions.remove(&addr);
        if removed.is_some() {
            debug!("Unregistered session at {} ({} live)", addr, sessions.len());
        }
        removed
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Snapshot of every entry as `(address, peer)`
    pub async fn entries(&self) -> Vec<(Ipv4Addr, Option<std::net::SocketAddr>)> {
        self.sessions
            .lock()
            .await
            .iter()
            .map(|(addr, session)| (*addr, session.peer()))
            .collect()
    }

    /// Log every entry at debug level
    pub async fn dump(&self) {
        for (addr, peer) in self.entries().await {
            match peer {
                Some(peer) => debug!("session {} -> {}", addr, peer),
                None => debug!("session {}", addr),
            }
        }
    }
}

fn first_free(sessions: &BTreeMap<Ipv4Addr, Arc<dyn MuxSession>>) -> Result<Ipv4Addr, TunnelError> {
    (FIRST_HOST..=LAST_HOST)
        .map(virtual_address)
        .find(|addr| !sessions.contains_key(addr))
        .ok_or(TunnelError::AllocationExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BoxStream;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::io;

    struct NullSession;

    #[async_trait]
    impl MuxSession for NullSession {
        async fn open(&self) -> io::Result<BoxStream> {
            Err(io::Error::new(io::ErrorKind::NotConnected, "null"))
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

    fn session() -> Arc<dyn MuxSession> {
        Arc::new(NullSession)
    }

    fn is_virtual_address(addr: Ipv4Addr) -> bool {
        let [a, b, c, d] = addr.octets();
        a == 10 && b == 0 && c == 0 && (FIRST_HOST..=LAST_HOST).contains(&d)
    }

    #[test]
    fn test_virtual_address_pool_bounds() {
        assert!(is_virtual_address(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(is_virtual_address(Ipv4Addr::new(10, 0, 0, 254)));
        assert!(!is_virtual_address(Ipv4Addr::new(10, 0, 0, 0)));
        assert!(!is_virtual_address(Ipv4Addr::new(10, 0, 0, 255)));
        assert!(!is_virtual_address(Ipv4Addr::new(10, 0, 1, 1)));
        assert_eq!(virtual_address(FIRST_HOST), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(virtual_address(LAST_HOST), Ipv4Addr::new(10, 0, 0, 254));
    }

    #[tokio::test]
    async fn test_allocate_first_free() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.allocate().await.unwrap(), Ipv4Addr::new(10, 0, 0, 1));

        registry
            .register(Ipv4Addr::new(10, 0, 0, 1), session())
            .await
            .unwrap();
        registry
            .register(Ipv4Addr::new(10, 0, 0, 3), session())
            .await
            .unwrap();
        assert_eq!(registry.allocate().await.unwrap(), Ipv4Addr::new(10, 0, 0, 2));
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let registry = SessionRegistry::new();
        let addr = Ipv4Addr::new(10, 0, 0, 7);
        registry.register(addr, session()).await.unwrap();
        let err = registry.register(addr, session()).await.unwrap_err();
        assert!(matches!(err, TunnelError::AlreadyRegistered(a) if a == addr));
    }

    #[tokio::test]
    async fn test_lookup_and_unregister() {
        let registry = SessionRegistry::new();
        let addr = registry.allocate_and_register(session()).await.unwrap();

        assert!(registry.lookup(addr).await.is_some());
        assert!(registry.lookup(Ipv4Addr::new(10, 0, 0, 99)).await.is_none());

        assert!(registry.unregister(addr).await.is_some());
        assert!(registry.unregister(addr).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let registry = SessionRegistry::new();
        for _ in 0..254 {
            registry.allocate_and_register(session()).await.unwrap();
        }
        assert_eq!(registry.len().await, 254);

        let err = registry.allocate_and_register(session()).await.unwrap_err();
        assert!(matches!(err, TunnelError::AllocationExhausted));
        assert!(matches!(
            registry.allocate().await,
            Err(TunnelError::AllocationExhausted)
        ));
        assert_eq!(registry.len().await, 254);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_no_duplicates() {
        let registry = Arc::new(SessionRegistry::new());

        let mut handles = Vec::new();
        for _ in 0..100 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.allocate_and_register(session()).await.unwrap()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let addr = handle.await.unwrap();
            assert!(is_virtual_address(addr));
            assert!(seen.insert(addr), "duplicate address {}", addr);
        }
        assert_eq!(registry.len().await, 100);

        for addr in seen {
            registry.unregister(addr).await;
        }
        assert!(registry.is_empty().await);
        assert_eq!(
            registry.allocate_and_register(session()).await.unwrap(),
            Ipv4Addr::new(10, 0, 0, 1)
        );
    }

    #[tokio::test]
    async fn test_entries() {
        let registry = SessionRegistry::new();
        registry.allocate_and_register(session()).await.unwrap();
        registry.allocate_and_register(session()).await.unwrap();

        let entries = registry.entries().await;
        assert_eq!(
            entries,
            vec![
                (Ipv4Addr::new(10, 0, 0, 1), None),
                (Ipv4Addr::new(10, 0, 0, 2), None)
            ]
        );
        registry.dump().await;
    }
}
