//! Minimal no-auth SOCKS5 client
//!
//! Used by the tunnel bridge to ask an agent to CONNECT on its side of a
//! multiplexed stream.

use crate::error::Socks5Error;
use crate::socks::codec::{decode_address, encode_address};
use crate::socks::consts::*;
use crate::socks::types::Address;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Negotiate no-auth and issue CONNECT to `target`
///
/// Returns the bound address reported by the server. Any reply other than
/// `VER=5, REP=0` is an error.
pub async fn connect_no_auth<S>(stream: &mut S, target: &Address) -> Result<Address, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(choice[0]));
    }
    match choice[1] {
        SOCKS5_AUTH_METHOD_NONE => {}
        SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE => return Err(Socks5Error::NoAcceptableMethod),
        other => return Err(Socks5Error::BadMethod(other)),
    }

    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
    request.extend_from_slice(&encode_address(target)?);
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(header[0]));
    }
    if header[1] != SOCKS5_REPLY_SUCCEEDED {
        return Err(Socks5Error::RequestRejected(header[1]));
    }

    let (bound, _) = decode_address(stream).await?;
    debug!("Inner CONNECT to {} bound at {}", target, bound);

    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_connect_no_auth_success() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[5, 1, 0])
            .read(&[5, 0])
            .write(&[5, 1, 0, 1, 127, 0, 0, 1, 0x1F, 0x90])
            .read(&[5, 0, 0, 1, 10, 0, 0, 9, 0x30, 0x39])
            .build();

        let target = Address::ipv4(Ipv4Addr::LOCALHOST, 8080);
        let bound = connect_no_auth(&mut stream, &target).await.unwrap();
        assert_eq!(bound, Address::ipv4(Ipv4Addr::new(10, 0, 0, 9), 12345));
    }

    #[tokio::test]
    async fn test_connect_no_auth_rejected() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[5, 1, 0])
            .read(&[5, 0])
            .write(&[5, 1, 0, 1, 127, 0, 0, 1, 0, 22])
            .read(&[5, 5, 0])
            .build();

        let target = Address::ipv4(Ipv4Addr::LOCALHOST, 22);
        let err = connect_no_auth(&mut stream, &target).await.unwrap_err();
        assert!(matches!(err, Socks5Error::RequestRejected(5)));
    }

    #[tokio::test]
    async fn test_connect_no_auth_method_refused() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[5, 1, 0])
            .read(&[5, 0xFF])
            .build();

        let target = Address::ipv4(Ipv4Addr::LOCALHOST, 22);
        let err = connect_no_auth(&mut stream, &target).await.unwrap_err();
        assert!(matches!(err, Socks5Error::NoAcceptableMethod));
    }
}
