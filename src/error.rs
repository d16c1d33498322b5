//! Error types for Socksgate
//!
//! This module defines all custom error types used throughout the application.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

/// Main error type for Socksgate operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SOCKS5 protocol error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),

    /// Reverse tunnel error
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// SOCKS5 specific errors
///
/// Every variant except [`Socks5Error::Io`] is fatal to the connection that
/// produced it.
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// The client offered a method other than the expected one
    #[error("Bad method: {0:#04x}")]
    BadMethod(u8),

    /// The client offered a number of methods other than one
    #[error("Bad method count: {0}")]
    BadMethodCount(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Token authentication failed
    #[error("Authentication failed")]
    AuthFailed,

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Extension payload was not valid base64 JSON
    #[error("Malformed extension: {0}")]
    MalformedExtension(String),

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// The remote SOCKS5 server refused a request
    #[error("Request rejected with reply code {0:#04x}")]
    RequestRejected(u8),

    /// Underlying stream failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reverse tunnel errors
#[derive(Error, Debug)]
pub enum TunnelError {
    /// No agent session owns the virtual address
    #[error("No session registered for {0}")]
    NoSession(Ipv4Addr),

    /// Destination cannot belong to any agent session
    #[error("Unroutable destination: {0}")]
    Unroutable(SocketAddr),

    /// Every virtual address is taken
    #[error("Virtual address pool exhausted")]
    AllocationExhausted,

    /// Virtual address already has a session
    #[error("Virtual address already registered: {0}")]
    AlreadyRegistered(Ipv4Addr),

    /// Shared-secret check before session setup failed
    #[error("Pipe authentication failed")]
    PipeAuthFailed,

    /// The multiplexed session is gone
    #[error("Session closed")]
    SessionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Config("invalid config".to_string());
        assert_eq!(format!("{}", err), "Configuration error: invalid config");

        let err = GatewayError::Transport("transport error".to_string());
        assert_eq!(format!("{}", err), "Transport error: transport error");
    }

    #[test]
    fn test_gateway_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "io error");
        let err: GatewayError = io_err.into();
        assert!(matches!(err, GatewayError::Io(_)));
    }

    #[test]
    fn test_gateway_error_from_socks5() {
        let err: GatewayError = Socks5Error::AuthFailed.into();
        assert!(matches!(err, GatewayError::Socks5(_)));
    }

    #[test]
    fn test_gateway_error_from_tunnel() {
        let err: GatewayError = TunnelError::AllocationExhausted.into();
        assert!(matches!(err, GatewayError::Tunnel(_)));
        assert_eq!(
            format!("{}", err),
            "Tunnel error: Virtual address pool exhausted"
        );
    }

    #[test]
    fn test_socks5_error_display() {
        let err = Socks5Error::UnsupportedVersion(4);
        assert_eq!(format!("{}", err), "Unsupported SOCKS version: 4");

        let err = Socks5Error::BadMethod(0x02);
        assert_eq!(format!("{}", err), "Bad method: 0x02");

        let err = Socks5Error::BadMethodCount(2);
        assert_eq!(format!("{}", err), "Bad method count: 2");

        let err = Socks5Error::AddressTypeNotSupported(0x99);
        assert_eq!(format!("{}", err), "Address type not supported: 153");

        let err = Socks5Error::MalformedExtension("bad base64".to_string());
        assert_eq!(format!("{}", err), "Malformed extension: bad base64");

        let err = Socks5Error::RequestRejected(0x05);
        assert_eq!(format!("{}", err), "Request rejected with reply code 0x05");
    }

    #[test]
    fn test_tunnel_error_display() {
        let err = TunnelError::NoSession(Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(format!("{}", err), "No session registered for 10.0.0.7");

        let err = TunnelError::PipeAuthFailed;
        assert_eq!(format!("{}", err), "Pipe authentication failed");
    }
}
