//! Bidirectional byte relay
//!
//! Forwards bytes between two streams with one task per direction. The first
//! direction to finish decides the outcome; the other one is then torn down
//! and both streams are closed.

use crate::pool::{BufferPool, PooledBuffer};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    AToB,
    BToA,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::AToB => write!(f, "A->B"),
            Direction::BToA => write!(f, "B->A"),
        }
    }
}

/// Relay data bidirectionally between two streams
///
/// EOF on either side is a normal end: the peer's write side is shut down
/// and `Ok(())` is returned. A read or write error ends the relay with that
/// error. Either way both streams are dropped before returning.
pub async fn relay<A, B>(a: A, b: B, pool: &BufferPool) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    let (done_tx, mut done_rx) = mpsc::channel(1);

    let a_to_b = tokio::spawn(run_pump(
        Direction::AToB,
        a_read,
        b_write,
        pool.get(),
        done_tx.clone(),
    ));
    let b_to_a = tokio::spawn(run_pump(
        Direction::BToA,
        b_read,
        a_write,
        pool.get(),
        done_tx,
    ));

    let first = done_rx.recv().await;

    a_to_b.abort();
    b_to_a.abort();
    let _ = a_to_b.await;
    let _ = b_to_a.await;

    match first {
        Some((direction, Ok(bytes))) => {
            debug!("{} finished: {} bytes", direction, bytes);
            Ok(())
        }
        Some((direction, Err(e))) => {
            debug!("{} error: {}", direction, e);
            Err(e)
        }
        // Both pumps vanished without reporting, which only happens on panic.
        None => Err(io::Error::new(io::ErrorKind::Other, "relay task aborted")),
    }
}

async fn run_pump<R, W>(
    direction: Direction,
    reader: R,
    writer: W,
    buf: PooledBuffer,
    done_tx: mpsc::Sender<(Direction, io::Result<u64>)>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = pump(reader, writer, buf).await;
    let _ = done_tx.send((direction, result)).await;
}

/// Copy from `reader` to `writer` until EOF, then shut `writer` down
async fn pump<R, W>(mut reader: R, mut writer: W, mut buf: PooledBuffer) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown after EOF failed: {}", e);
            }
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
}
