//! HTTP and SSE transports (spec.md §4.1).
//!
//! Plain `http` posts one JSON-RPC request per call and reads the JSON
//! response body directly. `sse` additionally opens a long-lived
//! `text/event-stream` leg via `reqwest-eventsource` and demultiplexes
//! inbound `message` events by id, the same way [`super::stdio::StdioTransport`]
//! demultiplexes lines from a child's stdout — the transport kind changes,
//! the "one reader task feeding a pending-request map" shape does not.

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

use crate::jsonrpc::{parse_inbound, InboundFrame, RpcId, RpcRequest};

use super::{remaining, Transport, TransportError, INITIALIZE_TIMEOUT};

const PROTOCOL_VERSION: &str = "2025-11-25";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

type Pending = DashMap<String, oneshot::Sender<Result<Value, TransportError>>>;

/// Whether the server side of the HTTP connection keeps a push channel open.
enum Mode {
    /// Request/response only: each call is a single POST whose body is the
    /// JSON-RPC result.
    Plain,
    /// The POST response is accepted (HTTP 202) and the actual result
    /// arrives later as a `message` event on the shared SSE stream.
    Sse { pending: std::sync::Arc<Pending> },
}

/// Speaks MCP over HTTP, optionally with an SSE leg for server-initiated
/// delivery of results (the "HTTP+SSE" transport variant in the MCP spec).
pub struct HttpTransport {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    next_id: std::sync::atomic::AtomicI64,
    mode: Mode,
}

impl HttpTransport {
    /// Connects in plain request/response mode: no SSE leg.
    pub async fn connect(url: &str, headers: &[(String, String)]) -> Result<Self, TransportError> {
        let transport = Self::build(url, headers, Mode::Plain)?;
        transport.initialize().await?;
        Ok(transport)
    }

    /// Connects with an SSE leg open for the lifetime of the transport.
    pub async fn connect_sse(
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Self, TransportError> {
        let pending: std::sync::Arc<Pending> = std::sync::Arc::new(DashMap::new());
        let transport = Self::build(url, headers, Mode::Sse { pending: pending.clone() })?;
        transport.spawn_event_stream(pending)?;
        transport.initialize().await?;
        Ok(transport)
    }

    fn build(url: &str, headers: &[(String, String)], mode: Mode) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            headers: headers.to_vec(),
            next_id: std::sync::atomic::AtomicI64::new(1),
            mode,
        })
    }

    fn spawn_event_stream(&self, pending: std::sync::Arc<Pending>) -> Result<(), TransportError> {
        let mut request = self.client.get(&self.url);
        for (k, v) in &self.headers {
            request = request.header(k, v);
        }
        let mut source = EventSource::new(request)
            .map_err(|e| TransportError::Io(format!("opening event source: {e}")))?;

        tokio::spawn(async move {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Message(message)) => {
                        if let Ok(InboundFrame::Response(resp)) = parse_inbound(&message.data) {
                            let key = resp.id.to_string();
                            if let Some((_, tx)) = pending.remove(&key) {
                                let _ = tx.send(resp.into_result().map_err(TransportError::Rpc));
                            }
                        }
                    }
                    Ok(Event::Open) => {}
                    Err(reqwest_eventsource::Error::StreamEnded) => {
                        fail_all(&pending, "event stream ended");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "sse event stream error");
                        fail_all(&pending, &format!("event stream error: {e}"));
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    fn next_request_id(&self) -> RpcId {
        RpcId::Number(self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "mcp-gateway", "version": env!("CARGO_PKG_VERSION") }
        });
        let deadline = Instant::now() + INITIALIZE_TIMEOUT;
        self.call("initialize", params, Some(deadline)).await?;
        Ok(())
    }

    async fn post_plain(&self, request: &RpcRequest, deadline: Option<Instant>) -> Result<Value, TransportError> {
        let mut builder = self.client.post(&self.url).json(request);
        for (k, v) in &self.headers {
            builder = builder.header(k, v);
        }
        if let Some(d) = remaining(deadline) {
            builder = builder.timeout(d);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        match parse_inbound(&body.to_string()) {
            Ok(InboundFrame::Response(resp)) => resp.into_result().map_err(TransportError::Rpc),
            _ => Err(TransportError::Malformed("expected a JSON-RPC response body".into())),
        }
    }

    async fn post_sse(
        &self,
        request: &RpcRequest,
        pending: &Pending,
        deadline: Option<Instant>,
    ) -> Result<Value, TransportError> {
        let (tx, rx) = oneshot::channel();
        pending.insert(request.id.to_string(), tx);

        let mut builder = self.client.post(&self.url).json(request);
        for (k, v) in &self.headers {
            builder = builder.header(k, v);
        }
        let accepted = builder
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        if !accepted.status().is_success() {
            pending.remove(&request.id.to_string());
            return Err(TransportError::Io(format!(
                "server rejected request: {}",
                accepted.status()
            )));
        }

        match remaining(deadline) {
            Some(d) => tokio::time::timeout(d, rx)
                .await
                .map_err(|_| TransportError::CallTimeout)?
                .map_err(|_| TransportError::Closed("event stream task gone".into()))?,
            None => rx
                .await
                .map_err(|_| TransportError::Closed("event stream task gone".into()))?,
        }
    }
}

fn fail_all(pending: &Pending, reason: &str) {
    let keys: Vec<String> = pending.iter().map(|e| e.key().clone()).collect();
    for key in keys {
        if let Some((_, tx)) = pending.remove(&key) {
            let _ = tx.send(Err(TransportError::Closed(reason.to_string())));
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        method: &str,
        params: Value,
        deadline: Option<Instant>,
    ) -> Result<Value, TransportError> {
        let request = RpcRequest::new(self.next_request_id(), method, params);
        match &self.mode {
            Mode::Plain => self.post_plain(&request, deadline).await,
            Mode::Sse { pending } => self.post_sse(&request, pending, deadline).await,
        }
    }

    async fn shutdown(&self) {
        if let Mode::Sse { pending } = &self.mode {
            fail_all(pending, "transport shut down");
        }
    }
}
