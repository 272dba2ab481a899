//! Transport drivers (C1, spec.md §4.1).
//!
//! Each transport exposes a blocking-from-the-caller's-perspective
//! `call(method, params) -> Result<Value, TransportError>`; arguments are
//! JSON-serialisable, results are raw `serde_json::Value` (the caller, i.e.
//! [`crate::client::Client`], knows how to interpret `tools/list` and
//! `tools/call` results).

pub mod http;
pub mod in_process;
pub mod stdio;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

pub use http::HttpTransport;
pub use in_process::InProcessTransport;
pub use stdio::StdioTransport;

/// Timeout for the MCP `initialize` handshake (spec.md §4.1): if the
/// subprocess/server does not respond within this window, the transport is
/// torn down and an error is returned. This is what prevents startup from
/// hanging when the other end does not speak the protocol.
pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the transport layer. Distinct from [`crate::error::GatewayError`]
/// because transports are reusable outside the gateway's error taxonomy;
/// [`crate::client::Client`] maps these onto `GatewayError::Transport` /
/// `GatewayError::Timeout`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed: {0}")]
    Closed(String),
    #[error("initialize timed out after {0:?}")]
    InitializeTimeout(Duration),
    #[error("call timed out")]
    CallTimeout,
    #[error("io error: {0}")]
    Io(String),
    #[error("server returned an error: {0}")]
    Rpc(String),
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// One framed JSON-RPC request/response round trip over a chosen transport.
///
/// Implementations must honour `deadline` when given: a call that would
/// otherwise hang forever (a wedged subprocess, an unreachable HTTP server)
/// must still return by `deadline`, surfaced as [`TransportError::CallTimeout`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        method: &str,
        params: Value,
        deadline: Option<Instant>,
    ) -> Result<Value, TransportError>;

    /// Tears down the transport (kills the subprocess, drops the HTTP
    /// client's connection pool, etc). Idempotent.
    async fn shutdown(&self);
}

/// Converts an `Option<Instant>` deadline into a `Duration` suitable for
/// `tokio::time::timeout`, treating a past deadline as "expire immediately"
/// rather than panicking on a negative duration.
pub(crate) fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}
