//! Original destination of redirected connections
//!
//! Connections that reach the intercept listener through an iptables
//! `REDIRECT` rule carry their pre-NAT destination in `SO_ORIGINAL_DST`.

use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Read the pre-redirect destination of an accepted stream
pub trait TcpStreamRedirExt {
    /// Destination the client originally dialed
    fn original_destination(&self) -> io::Result<SocketAddr>;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl TcpStreamRedirExt for TcpStream {
    fn original_destination(&self) -> io::Result<SocketAddr> {
        let socket = socket2::SockRef::from(self);
        let addr = match self.local_addr()? {
            SocketAddr::V4(..) => socket.original_dst()?,
            SocketAddr::V6(..) => socket.original_dst_ipv6()?,
        };
        addr.as_socket().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "original destination is not an inet address",
            )
        })
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl TcpStreamRedirExt for TcpStream {
    fn original_destination(&self) -> io::Result<SocketAddr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "original destination recovery is only supported on Linux",
        ))
    }
}

/// Source of destinations for intercepted connections
pub trait DestinationResolver: Send + Sync + 'static {
    /// Destination the intercepted connection was headed to
    fn resolve(&self, stream: &TcpStream) -> io::Result<SocketAddr>;
}

/// Resolver backed by `SO_ORIGINAL_DST`
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginalDst;

impl DestinationResolver for OriginalDst {
    fn resolve(&self, stream: &TcpStream) -> io::Result<SocketAddr> {
        stream.original_destination()
    }
}
