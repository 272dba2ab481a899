//! In-process transport: routes calls to Rust closures instead of a wire
//! protocol (spec.md §6, `bifrostInternal`).
//!
//! `bifrostInternal` is a client like any other from the dispatcher's point
//! of view, but its "transport" is just a lookup table of async handlers
//! registered at startup by [`crate::builtin`] — there is no process, socket,
//! or serialization round trip, only the `call(method, params)` shape the
//! other transports share.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use super::{Transport, TransportError};

/// A registered handler: takes the raw `params` of a `tools/call` (or
/// `tools/list`) request and returns a JSON result or a transport error.
pub type Handler = Box<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, TransportError>> + Send>>
        + Send
        + Sync,
>;

/// An in-process MCP "server": a fixed method-name to handler table.
///
/// Built once at startup (spec.md §6 lists `tools/list` and `tools/call` as
/// the only methods the gateway ever sends, so that is the entire surface
/// this transport needs to answer).
pub struct InProcessTransport {
    handlers: HashMap<String, Handler>,
}

impl InProcessTransport {
    pub fn builder() -> InProcessTransportBuilder {
        InProcessTransportBuilder {
            handlers: HashMap::new(),
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn call(
        &self,
        method: &str,
        params: Value,
        _deadline: Option<Instant>,
    ) -> Result<Value, TransportError> {
        match self.handlers.get(method) {
            Some(handler) => handler(params).await,
            None => Err(TransportError::Rpc(format!("no such method: {method}"))),
        }
    }

    async fn shutdown(&self) {}
}

/// Builds an [`InProcessTransport`] by registering one handler per method.
pub struct InProcessTransportBuilder {
    handlers: HashMap<String, Handler>,
}

impl InProcessTransportBuilder {
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
    {
        self.handlers
            .insert(name.into(), Box::new(move |params| Box::pin(handler(params))));
        self
    }

    pub fn build(self) -> InProcessTransport {
        InProcessTransport {
            handlers: self.handlers,
        }
    }
}
