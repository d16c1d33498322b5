//! Address and extension codec
//!
//! Reads and writes the variable-length address block and the base64 JSON
//! extension that follows a connection request.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::{Address, ExtensionPayload};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Decode an address block
///
/// # Address Format
///
/// ```text
/// +------+----------+----------+
/// | ATYP | DST.ADDR | DST.PORT |
/// +------+----------+----------+
/// |  1   | Variable |    2     |
/// +------+----------+----------+
/// ```
///
/// Returns the address and the number of bytes consumed, type byte included.
pub async fn decode_address<R>(reader: &mut R) -> Result<(Address, usize), Socks5Error>
where
    R: AsyncRead + Unpin,
{
    let addr_type = reader.read_u8().await?;

    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            reader.read_exact(&mut addr).await?;
            let port = reader.read_u16().await?;

            Ok((Address::ipv4(Ipv4Addr::from(addr), port), 1 + 4 + 2))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let domain_len = reader.read_u8().await? as usize;
            if domain_len == 0 {
                return Err(Socks5Error::InvalidAddress(
                    "empty domain name".to_string(),
                ));
            }

            let mut domain_buf = vec![0u8; domain_len];
            reader.read_exact(&mut domain_buf).await?;
            let port = reader.read_u16().await?;

            if !domain_buf.is_ascii() {
                return Err(Socks5Error::InvalidAddress(
                    "non-ASCII domain name".to_string(),
                ));
            }
            let domain = String::from_utf8(domain_buf)
                .map_err(|e| Socks5Error::InvalidAddress(e.to_string()))?;

            Ok((Address::Domain(domain, port), 1 + 1 + domain_len + 2))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            reader.read_exact(&mut addr).await?;
            let port = reader.read_u16().await?;

            Ok((Address::ipv6(Ipv6Addr::from(addr), port), 1 + 16 + 2))
        }

        other => Err(Socks5Error::AddressTypeNotSupported(other)),
    }
}

/// Encode an address block
///
/// Fails for a domain that does not fit the one-byte length prefix.
pub fn encode_address(address: &Address) -> Result<Vec<u8>, Socks5Error> {
    let mut buf = Vec::with_capacity(1 + 16 + 2);

    match address {
        Address::Ip(SocketAddr::V4(addr)) => {
            buf.push(SOCKS5_ADDR_TYPE_IPV4);
            buf.extend_from_slice(&addr.ip().octets());
            buf.extend_from_slice(&addr.port().to_be_bytes());
        }
        Address::Ip(SocketAddr::V6(addr)) => {
            buf.push(SOCKS5_ADDR_TYPE_IPV6);
            buf.extend_from_slice(&addr.ip().octets());
            buf.extend_from_slice(&addr.port().to_be_bytes());
        }
        Address::Domain(domain, port) => {
            buf.push(SOCKS5_ADDR_TYPE_DOMAIN);
            let len = u8::try_from(domain.len()).map_err(|_| {
                Socks5Error::InvalidAddress(format!("domain length {} out of range", domain.len()))
            })?;
            buf.push(len);
            buf.extend_from_slice(domain.as_bytes());
            buf.extend_from_slice(&port.to_be_bytes());
        }
    }

    Ok(buf)
}

/// Read and decode an extension payload of `declared_length` bytes
///
/// A length of zero means no extension. Bad base64 or bad JSON is an error.
pub async fn decode_extension<R>(
    reader: &mut R,
    declared_length: u16,
) -> Result<Option<ExtensionPayload>, Socks5Error>
where
    R: AsyncRead + Unpin,
{
    if declared_length == 0 {
        return Ok(None);
    }

    let mut raw = vec![0u8; declared_length as usize];
    reader.read_exact(&mut raw).await?;

    let json = STANDARD
        .decode(&raw)
        .map_err(|e| Socks5Error::MalformedExtension(format!("base64: {}", e)))?;
    let payload = serde_json::from_slice(&json)
        .map_err(|e| Socks5Error::MalformedExtension(format!("json: {}", e)))?;

    Ok(Some(payload))
}

/// Encode an extension payload to its wire form, without the length prefix
pub fn encode_extension(payload: &ExtensionPayload) -> Result<Vec<u8>, Socks5Error> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| Socks5Error::MalformedExtension(e.to_string()))?;
    let encoded = STANDARD.encode(json);
    if encoded.len() > u16::MAX as usize {
        return Err(Socks5Error::MalformedExtension(format!(
            "extension too long: {} bytes",
            encoded.len()
        )));
    }
    Ok(encoded.into_bytes())
}
