//! Shared-secret check run before a multiplexed session is set up
//!
//! The initiator sends `[len][secret]`, the responder answers with four
//! ASCII bytes: `succ` or `fail`.

use crate::error::TunnelError;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

const REPLY_SUCCESS: &[u8; 4] = b"succ";
const REPLY_FAILURE: &[u8; 4] = b"fail";

/// Failure during the secret exchange
#[derive(Debug, thiserror::Error)]
pub enum PipeAuthError {
    /// Secret rejected, or unexpected reply
    #[error(transparent)]
    Rejected(#[from] TunnelError),

    /// Stream failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Present `secret` to the responder
pub async fn pipe_auth<S>(stream: &mut S, secret: &[u8]) -> Result<(), PipeAuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let len = u8::try_from(secret.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "secret longer than 255 bytes")
    })?;

    let mut request = Vec::with_capacity(1 + secret.len());
    request.push(len);
    request.extend_from_slice(secret);
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if &reply != REPLY_SUCCESS {
        return Err(TunnelError::PipeAuthFailed.into());
    }

    debug!("Pipe authentication accepted");
    Ok(())
}

/// Check the secret presented by the initiator
pub async fn pipe_check<S>(stream: &mut S, secret: &[u8]) -> Result<(), PipeAuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let len = stream.read_u8().await?;
    let mut received = vec![0u8; len as usize];
    stream.read_exact(&mut received).await?;

    if received != secret {
        warn!("Pipe authentication rejected");
        stream.write_all(REPLY_FAILURE).await?;
        stream.flush().await?;
        return Err(TunnelError::PipeAuthFailed.into());
    }

    stream.write_all(REPLY_SUCCESS).await?;
    stream.flush().await?;
    Ok(())
}
