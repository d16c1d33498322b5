//! Agent-side SOCKS5 responder
//!
//! Serves the plain no-auth SOCKS5 exchange that arrives on each tunnel
//! stream. Only CONNECT is served.

use crate::error::Socks5Error;
use crate::pool::BufferPool;
use crate::relay::relay;
use crate::socks::codec::decode_address;
use crate::socks::consts::*;
use crate::socks::reply::{build_reply, io_error_to_reply_code};
use crate::socks::types::{Address, Command};
use crate::transport::{dial, SocketOpts};
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Serve one no-auth SOCKS5 session on `stream`
pub async fn serve_no_auth<S>(mut stream: S, socket_opts: &SocketOpts, pool: &BufferPool) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    negotiate_no_auth(&mut stream)
        .await
        .with_context(|| "Authentication negotiation failed")?;

    let (command, address) = read_command(&mut stream)
        .await
        .with_context(|| "Failed to parse SOCKS5 command")?;

    if command != Command::Connect {
        warn!("{} command not supported", command);
        build_reply(&mut stream, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED, None).await?;
        return Err(Socks5Error::CommandNotSupported(command.to_byte()).into());
    }

    debug!("Connecting to target: {}", address);

    let target = match dial(&address, socket_opts).await {
        Ok(target) => target,
        Err(e) => {
            warn!("Failed to connect to {}: {}", address, e);
            build_reply(&mut stream, io_error_to_reply_code(&e), None).await?;
            return Err(e).with_context(|| format!("Failed to connect to {}", address));
        }
    };

    let local_addr = target.local_addr().ok();
    build_reply(&mut stream, SOCKS5_REPLY_SUCCEEDED, local_addr).await?;

    info!("SOCKS5 tunnel established to {}", address);

    if let Err(e) = relay(stream, target, pool).await {
        debug!("Relay to {} ended with error: {}", address, e);
    }

    Ok(())
}

async fn negotiate_no_auth<S>(stream: &mut S) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let (version, num_methods) = (buf[0], buf[1]);
    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version));
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        return Err(Socks5Error::NoAcceptableMethod);
    }

    stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;
    Ok(())
}

async fn read_command<S>(stream: &mut S) -> Result<(Command, Address), Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(header[0]));
    }

    let command = Command::from_byte(header[1]);
    let (address, _) = decode_address(stream).await?;
    Ok((command, address))
}
