//! SOCKS5 type definitions
//!
//! Defines the values produced by parsing the gateway protocol.

use super::consts::*;
use crate::error::Socks5Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Request commands understood by the parser
///
/// Only [`Command::Connect`] and [`Command::GatewayState`] are served; the
/// rest are parsed so the dispatcher can reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND
    Bind,
    /// UDP ASSOCIATE
    UdpAssociate,
    /// ICMP
    Icmp,
    /// Vendor gateway-state probe
    GatewayState,
    /// Traceroute
    Traceroute,
    /// Any other command byte
    Unknown(u8),
}

impl Command {
    /// Parse a command byte
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Command::Connect,
            SOCKS5_CMD_TCP_BIND => Command::Bind,
            SOCKS5_CMD_UDP_ASSOCIATE => Command::UdpAssociate,
            SOCKS5_CMD_ICMP => Command::Icmp,
            SOCKS5_CMD_GATEWAY_STATE => Command::GatewayState,
            SOCKS5_CMD_TRACEROUTE => Command::Traceroute,
            other => Command::Unknown(other),
        }
    }

    /// Convert to the wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Connect => SOCKS5_CMD_TCP_CONNECT,
            Command::Bind => SOCKS5_CMD_TCP_BIND,
            Command::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
            Command::Icmp => SOCKS5_CMD_ICMP,
            Command::GatewayState => SOCKS5_CMD_GATEWAY_STATE,
            Command::Traceroute => SOCKS5_CMD_TRACEROUTE,
            Command::Unknown(byte) => byte,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP ASSOCIATE"),
            Command::Icmp => write!(f, "ICMP"),
            Command::GatewayState => write!(f, "GATEWAY STATE"),
            Command::Traceroute => write!(f, "TRACEROUTE"),
            Command::Unknown(byte) => write!(f, "UNDEFINED({:#04x})", byte),
        }
    }
}

/// Wire address types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// Four address bytes
    Ipv4,
    /// Length-prefixed host name
    Domain,
    /// Sixteen address bytes
    Ipv6,
}

impl AddressType {
    /// Parse an address type byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_ADDR_TYPE_IPV4 => Some(AddressType::Ipv4),
            SOCKS5_ADDR_TYPE_DOMAIN => Some(AddressType::Domain),
            SOCKS5_ADDR_TYPE_IPV6 => Some(AddressType::Ipv6),
            _ => None,
        }
    }

    /// Convert to the wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            AddressType::Ipv4 => SOCKS5_ADDR_TYPE_IPV4,
            AddressType::Domain => SOCKS5_ADDR_TYPE_DOMAIN,
            AddressType::Ipv6 => SOCKS5_ADDR_TYPE_IPV6,
        }
    }
}

/// Destination address of a request
///
/// The variant fixes the address type, so the host always matches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl Address {
    /// Create an address from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        Address::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create an address from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        Address::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a domain address, checking it fits the wire format
    pub fn domain(name: impl Into<String>, port: u16) -> Result<Self, Socks5Error> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_DOMAIN_LEN {
            return Err(Socks5Error::InvalidAddress(format!(
                "domain length {} out of range",
                name.len()
            )));
        }
        if !name.is_ascii() {
            return Err(Socks5Error::InvalidAddress(format!(
                "non-ASCII domain: {}",
                name
            )));
        }
        Ok(Address::Domain(name, port))
    }

    /// Address type of this address
    pub fn address_type(&self) -> AddressType {
        match self {
            Address::Ip(SocketAddr::V4(_)) => AddressType::Ipv4,
            Address::Ip(SocketAddr::V6(_)) => AddressType::Ipv6,
            Address::Domain(_, _) => AddressType::Domain,
        }
    }

    /// Host part as text (dotted quad, IPv6 groups or the domain)
    pub fn host(&self) -> String {
        match self {
            Address::Ip(addr) => addr.ip().to_string(),
            Address::Domain(domain, _) => domain.clone(),
        }
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            Address::Ip(addr) => addr.port(),
            Address::Domain(_, port) => *port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip(addr) => write!(f, "{}", addr),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Ip(addr)
    }
}

/// Credential presented during token authentication
#[derive(Clone, PartialEq, Eq)]
pub struct AuthCredential {
    /// Shared token
    pub token: Vec<u8>,
    /// Resource the client asks for
    pub resource_id: Vec<u8>,
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredential")
            .field("token", &format_args!("<{} bytes>", self.token.len()))
            .field("resource_id", &String::from_utf8_lossy(&self.resource_id))
            .finish()
    }
}

/// Client metadata carried in the extension payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionData {
    /// Address of the end user behind the client
    pub client_ip: String,
    /// Process that opened the connection
    pub process_name: String,
    /// Client operating system
    pub os: String,
}

/// Vendor extension appended to a connection request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionPayload {
    /// Payload schema version
    pub version: i64,
    /// Client metadata
    pub data: ExtensionData,
}

/// Parsed connection request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Requested command
    pub command: Command,
    /// Reserved byte as sent
    pub reserved: u8,
    /// Destination address
    pub address: Address,
    /// Optional vendor extension
    pub extension: Option<ExtensionPayload>,
}
