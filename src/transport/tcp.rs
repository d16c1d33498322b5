//! Outbound TCP dialing

use super::SocketOpts;
use crate::socks::Address;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::debug;

/// Dial a destination address
///
/// Domain names are resolved by the system resolver and every resolved
/// address is tried in turn. No timeout is applied beyond the OS connect
/// timeout.
pub async fn dial(address: &Address, opts: &SocketOpts) -> io::Result<TcpStream> {
    let stream = match address {
        Address::Ip(addr) => TcpStream::connect(*addr).await?,
        Address::Domain(domain, port) => TcpStream::connect((domain.as_str(), *port)).await?,
    };

    opts.hint(&stream);
    debug!("TCP connection established to {}", address);

    Ok(stream)
}

/// Dial a `host:port` string
pub async fn dial_addr(addr: &str, opts: &SocketOpts) -> io::Result<TcpStream> {
    let stream = match addr.parse::<SocketAddr>() {
        Ok(resolved) => TcpStream::connect(resolved).await?,
        Err(_) => TcpStream::connect(addr).await?,
    };

    opts.hint(&stream);
    debug!("TCP connection established to {}", addr);

    Ok(stream)
}
