//! SOCKS5 reply builder
//!
//! Constructs the reply messages written by the gateway and by the agent-side
//! responder.

use crate::socks::consts::*;
use crate::socks::types::AddressType;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build and send a full SOCKS5 reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// `bind_addr` defaults to `0.0.0.0:0`.
pub async fn build_reply<S>(
    stream: &mut S,
    reply_code: u8,
    bind_addr: Option<SocketAddr>,
) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let reply = reply_bytes(reply_code, bind_addr);
    stream.write_all(&reply).await?;
    stream.flush().await
}

/// Send the three-byte `[VER, REP, RSV]` reply the gateway uses after a dial
pub async fn short_reply<S>(stream: &mut S, reply_code: u8) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS5_VERSION, reply_code, SOCKS5_RESERVED])
        .await?;
    stream.flush().await
}

/// Send the zero-filled success header written after dispatch
///
/// Always ten bytes: the address type is echoed from the request while the
/// address and port bytes stay zero.
pub async fn synthetic_reply<S>(stream: &mut S, address_type: AddressType) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&synthetic_reply_bytes(address_type)).await?;
    stream.flush().await
}

pub(crate) fn synthetic_reply_bytes(address_type: AddressType) -> [u8; 10] {
    [
        SOCKS5_VERSION,
        SOCKS5_REPLY_SUCCEEDED,
        SOCKS5_RESERVED,
        address_type.to_byte(),
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

/// Map a dial error to the closest reply code
pub fn io_error_to_reply_code(error: &io::Error) -> u8 {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => SOCKS5_REPLY_CONNECTION_REFUSED,
        io::ErrorKind::TimedOut => SOCKS5_REPLY_HOST_UNREACHABLE,
        io::ErrorKind::AddrNotAvailable => SOCKS5_REPLY_HOST_UNREACHABLE,
        io::ErrorKind::PermissionDenied => SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
        _ => SOCKS5_REPLY_GENERAL_FAILURE,
    }
}

fn reply_bytes(reply_code: u8, bind_addr: Option<SocketAddr>) -> Vec<u8> {
    let bind_addr =
        bind_addr.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    let mut reply = vec![SOCKS5_VERSION, reply_code, SOCKS5_RESERVED];

    match bind_addr {
        SocketAddr::V4(addr) => {
            reply.push(SOCKS5_ADDR_TYPE_IPV4);
            reply.extend_from_slice(&addr.ip().octets());
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
        SocketAddr::V6(addr) => {
            reply.push(SOCKS5_ADDR_TYPE_IPV6);
            reply.extend_from_slice(&addr.ip().octets());
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
    }

    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_reply_bytes_ipv4() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 8080);
        let reply = reply_bytes(SOCKS5_REPLY_SUCCEEDED, Some(addr));

        assert_eq!(reply[0], SOCKS5_VERSION);
        assert_eq!(reply[1], SOCKS5_REPLY_SUCCEEDED);
        assert_eq!(reply[2], SOCKS5_RESERVED);
        assert_eq!(reply[3], SOCKS5_ADDR_TYPE_IPV4);
        assert_eq!(&reply[4..8], &[192, 168, 1, 1]);
        assert_eq!(&reply[8..10], &8080u16.to_be_bytes());
    }

    #[test]
    fn test_reply_bytes_ipv6() {
        let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 443);
        let reply = reply_bytes(SOCKS5_REPLY_SUCCEEDED, Some(addr));

        assert_eq!(reply[3], SOCKS5_ADDR_TYPE_IPV6);
        assert_eq!(reply.len(), 3 + 1 + 16 + 2);
    }

    #[test]
    fn test_reply_bytes_default_addr() {
        let reply = reply_bytes(SOCKS5_REPLY_GENERAL_FAILURE, None);
        assert_eq!(
            reply,
            vec![5, SOCKS5_REPLY_GENERAL_FAILURE, 0, 1, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_synthetic_reply_echoes_address_type() {
        assert_eq!(
            synthetic_reply_bytes(AddressType::Domain),
            [5, 0, 0, 3, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(synthetic_reply_bytes(AddressType::Ipv6)[3], 4);
    }

    #[tokio::test]
    async fn test_short_reply() {
        let mut buffer = Vec::new();
        short_reply(&mut buffer, SOCKS5_REPLY_NETWORK_UNREACHABLE)
            .await
            .unwrap();
        assert_eq!(buffer, vec![5, 3, 0]);
    }

    #[tokio::test]
    async fn test_build_reply_async() {
        let mut buffer = Vec::new();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 1080);

        build_reply(&mut buffer, SOCKS5_REPLY_SUCCEEDED, Some(addr))
            .await
            .unwrap();

        assert_eq!(buffer, vec![5, 0, 0, 1, 127, 0, 0, 1, 0x04, 0x38]);
    }

    #[test]
    fn test_io_error_to_reply_code() {
        let cases = vec![
            (io::ErrorKind::ConnectionRefused, SOCKS5_REPLY_CONNECTION_REFUSED),
            (io::ErrorKind::TimedOut, SOCKS5_REPLY_HOST_UNREACHABLE),
            (io::ErrorKind::AddrNotAvailable, SOCKS5_REPLY_HOST_UNREACHABLE),
            (io::ErrorKind::PermissionDenied, SOCKS5_REPLY_CONNECTION_NOT_ALLOWED),
            (io::ErrorKind::Other, SOCKS5_REPLY_GENERAL_FAILURE),
        ];

        for (kind, expected) in cases {
            let error = io::Error::new(kind, "test error");
            assert_eq!(io_error_to_reply_code(&error), expected);
        }
    }
}
