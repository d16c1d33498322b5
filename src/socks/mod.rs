//! SOCKS5 module for Socksgate
//!
//! This module implements the token-authenticated gateway protocol, the
//! commands it serves, and the plain no-auth SOCKS5 exchange spoken inside
//! the reverse tunnel.

mod client;
mod codec;
mod connect;
mod consts;
mod gateway_state;
mod handler;
mod handshake;
mod reply;
mod responder;
mod server;
mod types;

pub use client::connect_no_auth;
pub use codec::{decode_address, decode_extension, encode_address, encode_extension};
pub use connect::handle_connect;
pub use consts::*;
pub use gateway_state::handle_gateway_state;
pub use handler::{handle_gateway_connection, GatewayContext};
pub use handshake::{parse_request, ProtocolEngine, SessionState, TokenPolicy};
pub use reply::{build_reply, io_error_to_reply_code, short_reply, synthetic_reply};
pub use responder::serve_no_auth;
pub use server::{run_gateway, serve_gateway};
pub use types::{
    Address, AddressType, AuthCredential, Command, ConnectionRequest, ExtensionData,
    ExtensionPayload,
};
