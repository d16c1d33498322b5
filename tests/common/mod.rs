//! Test utilities for Socksgate
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Port on which nothing is listening
pub async fn closed_port() -> u16 {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr.port()
}

/// Spawn a TCP echo server that serves every accepted connection
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Gateway method negotiation followed by a token auth record
pub fn token_preamble(token: &[u8], resource_id: &[u8]) -> Vec<u8> {
    let mut data = vec![0x05, 0x01, 0x80];
    data.push(0x80);
    data.push(token.len() as u8);
    data.extend_from_slice(token);
    data.push(resource_id.len() as u8);
    data.extend_from_slice(resource_id);
    data
}

/// Gateway request for an IPv4 destination without extension
pub fn ipv4_request(cmd: u8, addr: SocketAddr) -> Vec<u8> {
    let ip = match addr {
        SocketAddr::V4(v4) => v4.ip().octets(),
        SocketAddr::V6(_) => panic!("IPv4 address expected"),
    };
    let mut data = vec![0x05, cmd, 0x00, 0x01];
    data.extend_from_slice(&ip);
    data.extend_from_slice(&addr.port().to_be_bytes());
    data.extend_from_slice(&[0x00, 0x00]);
    data
}

/// Connect to the gateway and complete negotiation and authentication
pub async fn gateway_login(gateway: SocketAddr, token: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(gateway).await.unwrap();
    stream
        .write_all(&token_preamble(token, b"resource"))
        .await
        .unwrap();

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x80, 0x80, 0x00]);
    stream
}
