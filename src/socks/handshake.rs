//! Gateway protocol engine
//!
//! Drives one client connection through method negotiation, token
//! authentication and request parsing. Every step writes its reply before
//! returning, and any error leaves the engine in [`SessionState::Failed`].

use crate::error::Socks5Error;
use crate::socks::codec::{decode_address, decode_extension};
use crate::socks::consts::*;
use crate::socks::types::{AuthCredential, Command, ConnectionRequest};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Where a connection is in the gateway protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the method negotiation
    AwaitingHandshake,
    /// Waiting for the token record
    AwaitingAuth,
    /// Waiting for the connection request
    AwaitingRequest,
    /// Request parsed and handed to a command handler
    Dispatched,
    /// Handler finished
    Closed,
    /// A protocol step failed
    Failed,
}

/// How presented tokens are checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TokenPolicy {
    /// Any token is accepted
    #[default]
    AcceptAny,
    /// The token must match exactly
    Require(Vec<u8>),
}

impl TokenPolicy {
    fn accepts(&self, token: &[u8]) -> bool {
        match self {
            TokenPolicy::AcceptAny => true,
            TokenPolicy::Require(expected) => expected.as_slice() == token,
        }
    }
}

/// Per-connection gateway state machine
#[derive(Debug)]
pub struct ProtocolEngine {
    state: SessionState,
    policy: TokenPolicy,
}

impl ProtocolEngine {
    /// Create an engine waiting for the handshake
    pub fn new(policy: TokenPolicy) -> Self {
        ProtocolEngine {
            state: SessionState::AwaitingHandshake,
            policy,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mark the request as handed to its handler
    pub fn dispatched(&mut self) {
        self.state = SessionState::Dispatched;
    }

    /// Mark the connection as finished
    pub fn close(&mut self) {
        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }
    }

    /// Method negotiation
    ///
    /// ```text
    /// client: [VER][NMETHODS][METHODS x NMETHODS]
    /// server: [VER][METHOD]
    /// ```
    ///
    /// Exactly one method, the token method, is accepted. Anything else gets
    /// `{0x05, 0xFF}` before the error is returned.
    pub async fn handshake<S>(&mut self, stream: &mut S) -> Result<(), Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.negotiate(stream).await;
        self.advance(result, SessionState::AwaitingAuth)
    }

    async fn negotiate<S>(&mut self, stream: &mut S) -> Result<(), Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await?;
        let (version, nmethods) = (header[0], header[1]);

        if version != SOCKS5_VERSION {
            reject_methods(stream).await;
            return Err(Socks5Error::UnsupportedVersion(version));
        }

        let mut methods = vec![0u8; nmethods as usize];
        stream.read_exact(&mut methods).await?;

        if nmethods != 1 {
            reject_methods(stream).await;
            return Err(Socks5Error::BadMethodCount(nmethods));
        }
        if methods[0] != SOCKS5_AUTH_METHOD_TOKEN {
            reject_methods(stream).await;
            return Err(Socks5Error::NoAcceptableMethod);
        }

        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_TOKEN])
            .await?;
        stream.flush().await?;

        debug!("Token method negotiated");
        Ok(())
    }

    /// Token authentication
    ///
    /// ```text
    /// client: [METHOD][TLEN][TOKEN][RLEN][RESOURCE_ID]
    /// server: [METHOD][STATUS]
    /// ```
    pub async fn authenticate<S>(&mut self, stream: &mut S) -> Result<AuthCredential, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.read_credential(stream).await;
        self.advance(result, SessionState::AwaitingRequest)
    }

    async fn read_credential<S>(&mut self, stream: &mut S) -> Result<AuthCredential, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let method = stream.read_u8().await?;
        if method != SOCKS5_AUTH_METHOD_TOKEN {
            return Err(Socks5Error::BadMethod(method));
        }

        let token = read_length_prefixed(stream).await?;
        let resource_id = read_length_prefixed(stream).await?;
        let credential = AuthCredential { token, resource_id };

        if !self.policy.accepts(&credential.token) {
            stream
                .write_all(&[SOCKS5_AUTH_METHOD_TOKEN, SOCKS5_AUTH_STATUS_FAILURE])
                .await?;
            stream.flush().await?;
            return Err(Socks5Error::AuthFailed);
        }

        stream
            .write_all(&[SOCKS5_AUTH_METHOD_TOKEN, SOCKS5_AUTH_STATUS_SUCCESS])
            .await?;
        stream.flush().await?;

        debug!("Authenticated {:?}", credential);
        Ok(credential)
    }

    /// Connection request
    ///
    /// ```text
    /// +----+-----+-------+------+----------+----------+--------+---------+
    /// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT | EXTLEN |   EXT   |
    /// +----+-----+-------+------+----------+----------+--------+---------+
    /// | 1  |  1  | X'00' |  1   | Variable |    2     |   2    | EXTLEN  |
    /// +----+-----+-------+------+----------+----------+--------+---------+
    /// ```
    ///
    /// Nothing is written here; the reply belongs to the command handler.
    pub async fn read_request<S>(&mut self, stream: &mut S) -> Result<ConnectionRequest, Socks5Error>
    where
        S: AsyncRead + Unpin,
    {
        // Dispatch is recorded by the caller once a handler is chosen.
        let result = parse_request(stream).await;
        if result.is_err() {
            self.state = SessionState::Failed;
        }
        result
    }

    fn advance<T>(
        &mut self,
        result: Result<T, Socks5Error>,
        next: SessionState,
    ) -> Result<T, Socks5Error> {
        self.state = match result {
            Ok(_) => next,
            Err(_) => SessionState::Failed,
        };
        result
    }
}

/// Parse a connection request without any state tracking
pub async fn parse_request<S>(stream: &mut S) -> Result<ConnectionRequest, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await?;
    let (version, cmd_byte, reserved) = (header[0], header[1], header[2]);

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version));
    }

    let command = Command::from_byte(cmd_byte);
    let (address, _) = decode_address(stream).await?;
    let extension_len = stream.read_u16().await?;
    let extension = decode_extension(stream, extension_len).await?;

    debug!("Parsed {} request to {}", command, address);

    Ok(ConnectionRequest {
        command,
        reserved,
        address,
        extension,
    })
}

async fn read_length_prefixed<S>(stream: &mut S) -> Result<Vec<u8>, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u8().await? as usize;
    let mut value = vec![0u8; len];
    stream.read_exact(&mut value).await?;
    Ok(value)
}

async fn reject_methods<S>(stream: &mut S)
where
    S: AsyncWrite + Unpin,
{
    // The connection is dropped right after, so a failed write changes nothing.
    let _ = stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
        .await;
    let _ = stream.flush().await;
}
