//! Plugin pipeline: ordered pre/post hooks around tool execution (C5,
//! spec.md §4.2).
//!
//! A `pre` hook may short-circuit the call by returning a [`ToolResult`]
//! directly, skipping the tool invocation entirely; per the spec's resolved
//! Open Question, `post` hooks still run afterward so logging/metrics
//! plugins see every call, short-circuited or not (see DESIGN.md).

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::message::{ToolCall, ToolResult};

/// What a `pre` hook decided.
pub enum PreOutcome {
    /// Proceed to the next hook, or to the tool itself if this was the last
    /// one.
    Continue(ToolCall),
    /// Skip the tool entirely and use this result instead.
    ShortCircuit(ToolResult),
}

/// One plugin in the pipeline. Implementors typically only override `pre`
/// or `post`, not both.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before the tool call. May rewrite the call's arguments, or
    /// short-circuit it.
    async fn pre(&self, ctx: &RequestContext, call: ToolCall) -> PreOutcome {
        let _ = ctx;
        PreOutcome::Continue(call)
    }

    /// Runs after the tool call (or after a short-circuit). May rewrite the
    /// result.
    async fn post(&self, ctx: &RequestContext, result: ToolResult) -> ToolResult {
        let _ = ctx;
        result
    }
}

/// An ordered, in-memory sequence of [`Plugin`]s.
#[derive(Default)]
pub struct PluginPipeline {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Runs every `pre` hook in order. Stops at the first short-circuit.
    ///
    /// Returns either the (possibly rewritten) call to execute, or the
    /// short-circuited result along with the index of every remaining
    /// plugin so the caller can still run their `post` hooks.
    pub async fn run_pre(&self, ctx: &RequestContext, mut call: ToolCall) -> PreOutcome {
        for plugin in &self.plugins {
            match plugin.pre(ctx, call).await {
                PreOutcome::Continue(next) => call = next,
                PreOutcome::ShortCircuit(result) => return PreOutcome::ShortCircuit(result),
            }
        }
        PreOutcome::Continue(call)
    }

    /// Runs every `post` hook in reverse declared order, regardless of
    /// whether the call was short-circuited (spec.md §5: "post-hooks in
    /// reverse declaration order").
    pub async fn run_post(&self, ctx: &RequestContext, mut result: ToolResult) -> ToolResult {
        for plugin in self.plugins.iter().rev() {
            result = plugin.post(ctx, result).await;
        }
        result
    }
}
