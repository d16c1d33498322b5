//! Multiplexed sessions
//!
//! [`MuxSession`] is the seam between the tunnel logic and the stream
//! multiplexer. [`YamuxSession`] implements it on top of `yamux`: a driver
//! task owns the connection and serves open and close commands sent over
//! channels, so the session handle itself is `Sync` and can sit in the
//! registry.

use crate::error::TunnelError;
use crate::transport::BoxStream;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tracing::{debug, warn};

/// Inbound streams buffered before new ones are refused
const INBOUND_BACKLOG: usize = 128;

/// One multiplexed connection to one agent
#[async_trait]
pub trait MuxSession: Send + Sync + 'static {
    /// Open a new outbound stream
    async fn open(&self) -> io::Result<BoxStream>;

    /// Next stream opened by the peer, `None` once the session is closed
    async fn accept(&self) -> Option<BoxStream>;

    /// Close the session and every stream in it
    async fn close(&self);

    /// Whether the session has been observed closed
    fn is_closed(&self) -> bool;

    /// Resolve once the session is closed
    async fn closed(&self);

    /// Remote address of the underlying connection, when known
    fn peer(&self) -> Option<SocketAddr> {
        None
    }
}

enum DriverCommand {
    Open(oneshot::Sender<io::Result<yamux::Stream>>),
    Close,
}

/// [`MuxSession`] backed by a yamux connection
pub struct YamuxSession {
    commands: mpsc::Sender<DriverCommand>,
    inbound: Mutex<mpsc::Receiver<yamux::Stream>>,
    closed: watch::Receiver<bool>,
    peer: Option<SocketAddr>,
}

impl YamuxSession {
    /// Start a session in client mode
    pub fn client<S>(io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::start(io, yamux::Mode::Client)
    }

    /// Start a session in server mode
    pub fn server<S>(io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::start(io, yamux::Mode::Server)
    }

    /// Record the remote address for logging
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    fn start<S>(io: S, mode: yamux::Mode) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let conn = yamux::Connection::new(io.compat(), yamux::Config::default(), mode);

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BACKLOG);
        let (closed_tx, closed_rx) = watch::channel(false);

        let mut driver = Driver {
            conn,
            commands: cmd_rx,
            inbound: inbound_tx,
            pending_opens: VecDeque::new(),
            closing: false,
        };

        tokio::spawn(async move {
            match std::future::poll_fn(|cx| driver.poll_drive(cx)).await {
                Ok(()) => debug!("Multiplexed session closed"),
                Err(e) => debug!("Multiplexed session ended: {}", e),
            }
            drop(driver);
            closed_tx.send_replace(true);
        });

        YamuxSession {
            commands: cmd_tx,
            inbound: Mutex::new(inbound_rx),
            closed: closed_rx,
            peer: None,
        }
    }
}

#[async_trait]
impl MuxSession for YamuxSession {
    async fn open(&self) -> io::Result<BoxStream> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(DriverCommand::Open(tx))
            .await
            .map_err(|_| session_closed())?;
        let stream = rx.await.map_err(|_| session_closed())??;
        Ok(Box::new(stream.compat()))
    }

    async fn accept(&self) -> Option<BoxStream> {
        let stream = self.inbound.lock().await.recv().await?;
        Some(Box::new(stream.compat()))
    }

    async fn close(&self) {
        let _ = self.commands.send(DriverCommand::Close).await;
        self.closed().await;
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn closed(&self) {
        let mut closed = self.closed.clone();
        // An error means the driver is gone, which is also closed.
        let _ = closed.wait_for(|closed| *closed).await;
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

fn session_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, TunnelError::SessionClosed)
}

struct Driver<S> {
    conn: yamux::Connection<Compat<S>>,
    commands: mpsc::Receiver<DriverCommand>,
    inbound: mpsc::Sender<yamux::Stream>,
    pending_opens: VecDeque<oneshot::Sender<io::Result<yamux::Stream>>>,
    closing: bool,
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn poll_drive(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), yamux::ConnectionError>> {
        loop {
            while !self.closing {
                match self.commands.poll_recv(cx) {
                    Poll::Ready(Some(DriverCommand::Open(tx))) => self.pending_opens.push_back(tx),
                    Poll::Ready(Some(DriverCommand::Close)) | Poll::Ready(None) => {
                        self.closing = true
                    }
                    Poll::Pending => break,
                }
            }

            if self.closing {
                self.pending_opens.clear();
                return self.conn.poll_close(cx);
            }

            while let Some(waiter) = self.pending_opens.pop_front() {
                match self.conn.poll_new_outbound(cx) {
                    Poll::Ready(Ok(stream)) => {
                        let _ = waiter.send(Ok(stream));
                    }
                    Poll::Ready(Err(e)) => {
                        let _ = waiter.send(Err(io::Error::new(io::ErrorKind::Other, e)));
                    }
                    Poll::Pending => {
                        self.pending_opens.push_front(waiter);
                        break;
                    }
                }
            }

            match self.conn.poll_next_inbound(cx) {
                Poll::Ready(Some(Ok(stream))) => {
                    if self.inbound.try_send(stream).is_err() {
                        warn!("Inbound stream backlog full, dropping stream");
                    }
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
