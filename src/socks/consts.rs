//! SOCKS5 protocol constants
//!
//! Defines the constants used by the token gateway and by the plain no-auth
//! SOCKS5 exchange spoken inside the reverse tunnel.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// Vendor token authentication
pub const SOCKS5_AUTH_METHOD_TOKEN: u8 = 0x80;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// Token authentication status
/// Token accepted
pub const SOCKS5_AUTH_STATUS_SUCCESS: u8 = 0x00;
/// Token rejected
pub const SOCKS5_AUTH_STATUS_FAILURE: u8 = 0x01;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// TCP BIND command (parsed, never served)
pub const SOCKS5_CMD_TCP_BIND: u8 = 0x02;
/// UDP ASSOCIATE command (parsed, never served)
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;
/// ICMP command (parsed, never served)
pub const SOCKS5_CMD_ICMP: u8 = 0x04;
/// Vendor gateway-state probe
pub const SOCKS5_CMD_GATEWAY_STATE: u8 = 0x05;
/// Traceroute command (parsed, never served)
pub const SOCKS5_CMD_TRACEROUTE: u8 = 0x09;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reply codes
/// Succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;
/// General SOCKS server failure
pub const SOCKS5_REPLY_GENERAL_FAILURE: u8 = 0x01;
/// Connection not allowed by ruleset
pub const SOCKS5_REPLY_CONNECTION_NOT_ALLOWED: u8 = 0x02;
/// Network unreachable; the gateway uses it for every dial failure
pub const SOCKS5_REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
/// Host unreachable
pub const SOCKS5_REPLY_HOST_UNREACHABLE: u8 = 0x04;
/// Connection refused
pub const SOCKS5_REPLY_CONNECTION_REFUSED: u8 = 0x05;
/// Command not supported
pub const SOCKS5_REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;

// Reserved byte
/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_version() {
        assert_eq!(SOCKS5_VERSION, 5);
    }

    #[test]
    fn test_auth_methods() {
        assert_eq!(SOCKS5_AUTH_METHOD_NONE, 0);
        assert_eq!(SOCKS5_AUTH_METHOD_TOKEN, 0x80);
        assert_eq!(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE, 255);
    }

    #[test]
    fn test_commands() {
        assert_eq!(SOCKS5_CMD_TCP_CONNECT, 1);
        assert_eq!(SOCKS5_CMD_GATEWAY_STATE, 5);
        assert_eq!(SOCKS5_CMD_TRACEROUTE, 9);
    }

    #[test]
    fn test_reply_codes() {
        assert_eq!(SOCKS5_REPLY_SUCCEEDED, 0);
        assert_eq!(SOCKS5_REPLY_NETWORK_UNREACHABLE, 3);
        assert_eq!(SOCKS5_REPLY_COMMAND_NOT_SUPPORTED, 7);
    }
}
