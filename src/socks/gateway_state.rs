//! Gateway-state probe responder
//!
//! After a success header the client sends small JSON queries such as
//! `{"action":"heart"}` and the gateway answers each one with a canned
//! status object.

use crate::socks::consts::*;
use crate::socks::reply::short_reply;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const STATE_READ_SIZE: usize = 1024;

#[derive(Debug, Deserialize)]
struct StateQuery {
    action: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct StateReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<&'static str>,
    state: &'static str,
}

fn reply_for(action: &str) -> Option<StateReply> {
    let msg = match action {
        "heart" => None,
        "onlineuser" => Some("1"),
        "traffic" => Some("100,100"),
        _ => return None,
    };
    Some(StateReply { msg, state: "0" })
}

/// Serve gateway-state queries until EOF or an I/O error
///
/// Each read is treated as one query. Input that is not a JSON object with
/// an `action` field is skipped, as are unknown actions.
pub async fn handle_gateway_state<S>(stream: &mut S) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    short_reply(stream, SOCKS5_REPLY_SUCCEEDED).await?;

    let mut buf = [0u8; STATE_READ_SIZE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let query: StateQuery = match serde_json::from_slice(&buf[..n]) {
            Ok(query) => query,
            Err(e) => {
                debug!("Skipping unparseable state query: {}", e);
                continue;
            }
        };

        let Some(reply) = reply_for(&query.action) else {
            debug!("Ignoring unknown state action: {}", query.action);
            continue;
        };

        let body = serde_json::to_vec(&reply)?;
        stream.write_all(&body).await?;
        stream.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_bodies() {
        let encode = |action| serde_json::to_string(&reply_for(action).unwrap()).unwrap();
        assert_eq!(encode("heart"), r#"{"state":"0"}"#);
        assert_eq!(encode("onlineuser"), r#"{"msg":"1","state":"0"}"#);
        assert_eq!(encode("traffic"), r#"{"msg":"100,100","state":"0"}"#);
        assert!(reply_for("reboot").is_none());
    }

    #[tokio::test]
    async fn test_state_session() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[5, 0, 0])
            .read(br#"{"action":"heart"}"#)
            .write(br#"{"state":"0"}"#)
            .read(b"garbage")
            .read(br#"{"action":"unknown"}"#)
            .read(br#"{"action":"traffic"}"#)
            .write(br#"{"msg":"100,100","state":"0"}"#)
            .build();

        handle_gateway_state(&mut stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_state_session_read_error() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[5, 0, 0])
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = handle_gateway_state(&mut stream).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
