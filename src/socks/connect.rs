//! TCP CONNECT handler
//!
//! Dials the requested destination and relays bytes between it and the
//! client.

use crate::pool::BufferPool;
use crate::relay::relay;
use crate::socks::consts::*;
use crate::socks::reply::{build_reply, short_reply};
use crate::socks::types::Address;
use crate::transport::{dial, SocketOpts};
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Handle TCP CONNECT command
///
/// This function:
/// 1. Writes a provisional success reply
/// 2. Dials the destination once, without retry
/// 3. Writes `{0x05, 0x03, 0x00}` on failure or `{0x05, 0x00, 0x00}` on success
/// 4. Relays data bidirectionally until either side finishes
///
/// Relay errors are logged only. A dial failure is returned to the caller.
pub async fn handle_connect<S>(
    mut client: S,
    address: &Address,
    socket_opts: &SocketOpts,
    pool: &BufferPool,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    build_reply(&mut client, SOCKS5_REPLY_SUCCEEDED, None)
        .await
        .with_context(|| "Failed to send provisional reply")?;

    debug!("Connecting to target: {}", address);

    let target = match dial(address, socket_opts).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", address, e);
            // The dial error is what gets reported, not a failed reply write.
            let _ = short_reply(&mut client, SOCKS5_REPLY_NETWORK_UNREACHABLE).await;
            return Err(e).with_context(|| format!("Failed to connect to {}", address));
        }
    };

    short_reply(&mut client, SOCKS5_REPLY_SUCCEEDED)
        .await
        .with_context(|| "Failed to send connect reply")?;

    info!("SOCKS5 tunnel established to {}", address);

    if let Err(e) = relay(client, target, pool).await {
        debug!("Relay to {} ended with error: {}", address, e);
    }

    Ok(())
}
