//! Reverse tunnel
//!
//! Agents dial the tunnel server and carry a multiplexed session. The server
//! gives every session a virtual address and forwards connections redirected
//! to that address through the session, where the agent completes them.
//!
//! ```text
//! Local app -> intercept listener -> TunnelBridge -> session -> agent -> 127.0.0.1:port
//! ```

mod agent;
mod bridge;
mod pipe_auth;
mod registry;
mod server;
mod session;

pub use agent::{run_agent, serve_agent_session};
pub use bridge::TunnelBridge;
pub use pipe_auth::{pipe_auth, pipe_check, PipeAuthError};
pub use registry::SessionRegistry;
pub use server::{run_tunnel, serve_agent, TunnelServer};
pub use session::{MuxSession, YamuxSession};
