//! Request Context: an ambient carrier for a deadline, cancellation signal,
//! and per-request tool/client filters (spec.md §3).
//!
//! Context filtering **narrows** client configuration; it can never broaden
//! it (testable property 2, spec.md §8).

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::ToolFilter;

/// A whitelist of qualified tool names, or name patterns of the form
/// `<client>-*`.
#[derive(Clone, Debug, Default)]
pub struct ToolNamePatterns(Vec<String>);

impl ToolNamePatterns {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(patterns.into_iter().map(Into::into).collect())
    }

    /// True when `qualified_name` matches at least one pattern: either an
    /// exact match, or `<client>-*` matching any tool of that client.
    pub fn matches(&self, qualified_name: &str) -> bool {
        self.0.iter().any(|pattern| {
            if let Some(prefix) = pattern.strip_suffix("-*") {
                qualified_name
                    .strip_prefix(prefix)
                    .map(|rest| rest.starts_with('-'))
                    .unwrap_or(false)
            } else {
                pattern == qualified_name
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ambient per-request carrier: deadline, cancellation, and optional filter
/// sets. Cloned cheaply (the cancellation token is reference-counted).
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
    /// Whitelist of client names, or `None` meaning "no client filter".
    include_clients: Option<ToolFilter>,
    /// Whitelist of qualified tool names/patterns, or `None` meaning "no
    /// tool filter".
    include_tools: Option<ToolNamePatterns>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_include_clients(mut self, filter: ToolFilter) -> Self {
        self.include_clients = Some(filter);
        self
    }

    pub fn with_include_tools(mut self, patterns: ToolNamePatterns) -> Self {
        self.include_tools = Some(patterns);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// True when `client_name` is visible under this context's client
    /// filter. A context with no filter allows everything — filtering only
    /// narrows, never broadens, so the absence of a filter is the identity.
    pub fn allows_client(&self, client_name: &str) -> bool {
        match &self.include_clients {
            None => true,
            Some(filter) => filter.allows(client_name),
        }
    }

    /// True when `qualified_tool_name` is visible under this context's tool
    /// filter.
    pub fn allows_tool(&self, qualified_tool_name: &str) -> bool {
        match &self.include_tools {
            None => true,
            Some(patterns) => patterns.matches(qualified_tool_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filter_allows_everything() {
        let ctx = RequestContext::new();
        assert!(ctx.allows_client("anything"));
        assert!(ctx.allows_tool("anything-anything"));
    }

    #[test]
    fn client_whitelist_narrows() {
        let ctx = RequestContext::new().with_include_clients(ToolFilter::named(["temperature"]));
        assert!(ctx.allows_client("temperature"));
        assert!(!ctx.allows_client("gotest"));
    }

    #[test]
    fn tool_pattern_wildcard_matches_client_prefix() {
        let ctx = RequestContext::new()
            .with_include_tools(ToolNamePatterns::new(["gotest-*", "bifrostInternal-echo"]));
        assert!(ctx.allows_tool("gotest-uuid_generate"));
        assert!(ctx.allows_tool("bifrostInternal-echo"));
        assert!(!ctx.allows_tool("bifrostInternal-calculator"));
        // "gotestx-foo" must not match the "gotest-*" pattern's prefix.
        assert!(!ctx.allows_tool("gotestx-foo"));
    }
}
