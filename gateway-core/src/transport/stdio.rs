//! STDIO subprocess transport (spec.md §4.1).
//!
//! A single writer task serializes outbound frames onto the child's stdin;
//! a single reader task demultiplexes inbound frames by JSON-RPC `id` into a
//! map of pending request channels. The transport is half-duplex at the
//! framing layer — any number of requests may be in flight, each addressed
//! by id — but exactly one in-flight MCP request per client at a time is
//! enforced one layer up, by [`crate::client::Client`] (spec.md §3 invariant i).

use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::jsonrpc::{parse_inbound, InboundFrame, RpcId, RpcNotification, RpcRequest};

use super::{remaining, Transport, TransportError, INITIALIZE_TIMEOUT};

const PROTOCOL_VERSION: &str = "2025-11-25";

type Pending = DashMap<String, oneshot::Sender<Result<Value, TransportError>>>;

/// Spawns an MCP server as a child process and speaks line-delimited
/// JSON-RPC over its stdin/stdout.
pub struct StdioTransport {
    child: Mutex<Child>,
    outbound: mpsc::UnboundedSender<String>,
    pending: std::sync::Arc<Pending>,
    next_id: AtomicI64,
    /// Captured stderr, surfaced on transport errors for operator debugging.
    stderr_tail: std::sync::Arc<Mutex<Vec<String>>>,
}

impl StdioTransport {
    /// Spawns `command args` with the given environment variables appended
    /// to the inherited process environment, and performs the MCP
    /// `initialize` handshake within [`INITIALIZE_TIMEOUT`].
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<Self, TransportError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::Io(format!("spawn {command}: {e}")))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let pending: std::sync::Arc<Pending> = std::sync::Arc::new(DashMap::new());
        let stderr_tail = std::sync::Arc::new(Mutex::new(Vec::new()));

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        // Single writer task: serializes outbound frames onto stdin.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(frame) = outbound_rx.recv().await {
                if stdin.write_all(frame.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Single reader task: demultiplexes inbound frames by id.
        let reader_pending = std::sync::Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match parse_inbound(&line) {
                            Ok(InboundFrame::Response(resp)) => {
                                let key = resp.id.to_string();
                                if let Some((_, tx)) = reader_pending.remove(&key) {
                                    let _ = tx.send(resp.into_result().map_err(TransportError::Rpc));
                                }
                            }
                            Ok(InboundFrame::ServerRequest { .. }) => {
                                // `roots/list` and similar are not answered
                                // here; the gateway declares empty roots via
                                // the initialize capabilities instead of a
                                // live round trip, so nothing needs a reply.
                            }
                            Ok(InboundFrame::Notification { .. }) => {}
                            Err(_) => {}
                        }
                    }
                    Ok(None) => {
                        Self::fail_all(&reader_pending, "transport closed (EOF)");
                        break;
                    }
                    Err(e) => {
                        Self::fail_all(&reader_pending, &format!("read error: {e}"));
                        break;
                    }
                }
            }
        });

        let stderr_collector = std::sync::Arc::clone(&stderr_tail);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut tail = stderr_collector.lock().await;
                tail.push(line);
                if tail.len() > 200 {
                    tail.remove(0);
                }
            }
        });

        let transport = Self {
            child: Mutex::new(child),
            outbound: outbound_tx,
            pending,
            next_id: AtomicI64::new(1),
            stderr_tail,
        };

        transport.initialize().await?;
        Ok(transport)
    }

    fn fail_all(pending: &Pending, reason: &str) {
        let keys: Vec<String> = pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(TransportError::Closed(reason.to_string())));
            }
        }
    }

    fn next_request_id(&self) -> RpcId {
        RpcId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn send_request(
        &self,
        id: RpcId,
        method: &str,
        params: Value,
    ) -> Result<oneshot::Receiver<Result<Value, TransportError>>, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.to_string(), tx);
        let request = RpcRequest::new(id, method, params);
        let frame = serde_json::to_string(&request)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed("writer task gone".into()))?;
        Ok(rx)
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        let id = self.next_request_id();
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "mcp-gateway", "version": env!("CARGO_PKG_VERSION") }
        });
        let rx = self.send_request(id, "initialize", params).await?;

        let _initialize_result: Value = tokio::time::timeout(INITIALIZE_TIMEOUT, rx)
            .await
            .map_err(|_| TransportError::InitializeTimeout(INITIALIZE_TIMEOUT))?
            .map_err(|_| TransportError::Closed("writer task gone".into()))??;

        let notification = RpcNotification::new("notifications/initialized", serde_json::json!({}));
        let frame = serde_json::to_string(&notification)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed("writer task gone".into()))?;
        Ok(())
    }

    /// Returns the last captured lines of the child's stderr, for error
    /// messages.
    pub async fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.lock().await.clone()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(
        &self,
        method: &str,
        params: Value,
        deadline: Option<Instant>,
    ) -> Result<Value, TransportError> {
        let id = self.next_request_id();
        let rx = self.send_request(id, method, params).await?;

        let value: Value = match remaining(deadline) {
            Some(d) => tokio::time::timeout(d, rx)
                .await
                .map_err(|_| TransportError::CallTimeout)?
                .map_err(|_| TransportError::Closed("writer task gone".into()))??,
            None => rx
                .await
                .map_err(|_| TransportError::Closed("writer task gone".into()))??,
        };
        Ok(value)
    }

    async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        Self::fail_all(&self.pending, "transport shut down");
    }
}
