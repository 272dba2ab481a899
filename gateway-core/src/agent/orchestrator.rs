//! Agent orchestrator: classify -> fan out -> iterate (C6, spec.md §5).
//!
//! Deliberately simpler than the teacher's compiled-graph `ReactRunner` —
//! there is no think/act/observe node graph here, just a loop, because the
//! spec's orchestration is a fixed three-step cycle rather than an
//! arbitrary graph a caller assembles (see DESIGN.md for the tradeoff).
//! What is kept from the teacher is the shape of each step: an
//! `Arc<dyn LlmInvoker>` callback standing in for `Arc<dyn LlmClient>`, and
//! the pre-sized ordered-by-index fan-out used for parallel tool calls
//! (`crate::tools::batch::BatchTool` in the teacher, `Dispatcher::dispatch_many`
//! here).

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::context::RequestContext;
use crate::dispatcher::Dispatcher;
use crate::error::GatewayError;
use crate::manager::Manager;
use crate::message::ToolResult;

use super::types::{
    ConversationTurn, ExecutionClass, LlmInvoker, PendingApproval, StepOutcome, TurnRole,
};

/// Runs the classify/fan-out/iterate loop to completion or until
/// `max_depth` turns have elapsed without the model finishing on its own.
pub struct AgentOrchestrator {
    manager: Arc<Manager>,
    dispatcher: Arc<Dispatcher>,
    llm: Arc<dyn LlmInvoker>,
    max_depth: u32,
}

impl AgentOrchestrator {
    pub fn new(
        manager: Arc<Manager>,
        dispatcher: Arc<Dispatcher>,
        llm: Arc<dyn LlmInvoker>,
        max_depth: u32,
    ) -> Self {
        Self {
            manager,
            dispatcher,
            llm,
            max_depth,
        }
    }

    /// Runs the full loop from an initial conversation, calling the LLM,
    /// classifying and running auto-executable tool calls, and repeating
    /// until the model stops requesting tools, `max_depth` is exhausted, or
    /// an approval gate is hit.
    #[instrument(skip(self, ctx, history))]
    pub async fn run(
        &self,
        ctx: &RequestContext,
        mut history: Vec<ConversationTurn>,
    ) -> Result<StepOutcome, GatewayError> {
        for depth in 0..self.max_depth {
            if ctx.is_cancelled() {
                return Err(GatewayError::Agent("request cancelled".into()));
            }
            let turn = self.llm.invoke(&history).await?;

            if turn.tool_calls.is_empty() {
                history.push(ConversationTurn {
                    role: TurnRole::Assistant,
                    content: turn.content,
                    tool_calls: vec![],
                    tool_results: vec![],
                });
                return Ok(StepOutcome::Finished(history));
            }

            info!(depth, calls = turn.tool_calls.len(), "agent turn requested tool calls");

            let mut auto_calls = Vec::new();
            let mut pending = Vec::new();
            for call in turn.tool_calls.clone() {
                match self.classify(ctx, &call.tool_name).await {
                    ExecutionClass::Auto => auto_calls.push(call),
                    ExecutionClass::RequiresApproval => pending.push(PendingApproval { call }),
                }
            }

            let auto_results = self.dispatcher.dispatch_many(ctx, auto_calls.clone()).await;

            history.push(ConversationTurn {
                role: TurnRole::Assistant,
                content: turn.content,
                tool_calls: turn.tool_calls.clone(),
                tool_results: vec![],
            });
            if !auto_results.is_empty() {
                history.push(tool_results_turn(&auto_results));
            }

            if !pending.is_empty() {
                return Ok(StepOutcome::NeedsApproval {
                    history_so_far: history,
                    pending,
                });
            }
        }

        warn!(max_depth = self.max_depth, "agent reached max depth without finishing");
        Ok(StepOutcome::DepthExceeded(history))
    }

    /// Resumes a loop that previously stopped on [`StepOutcome::NeedsApproval`],
    /// given the host's approve/deny decision for each pending call.
    ///
    /// `approved` must be the same length and order as the `pending` list
    /// the orchestrator returned; a `false` entry is recorded as a denied
    /// tool result rather than executed.
    pub async fn resume_with_approvals(
        &self,
        ctx: &RequestContext,
        mut history: Vec<ConversationTurn>,
        pending: Vec<PendingApproval>,
        approved: Vec<bool>,
    ) -> Result<StepOutcome, GatewayError> {
        if approved.len() != pending.len() {
            return Err(GatewayError::Validation(format!(
                "expected {} approval decisions, got {}",
                pending.len(),
                approved.len()
            )));
        }

        let mut to_run = Vec::new();
        let mut denied = Vec::new();
        for (decision, approval) in approved.into_iter().zip(pending.into_iter()) {
            if decision {
                to_run.push(approval.call);
            } else {
                denied.push(ToolResult::error(approval.call.call_id, "denied by operator"));
            }
        }

        let mut results = self.dispatcher.dispatch_many(ctx, to_run).await;
        results.extend(denied);
        if !results.is_empty() {
            history.push(tool_results_turn(&results));
        }

        self.run(ctx, history).await
    }

    /// A call is auto-eligible only if its client's `toolsToAutoExecute`
    /// permits it *and* it passes the request's `includeTools` filter
    /// (spec.md §4.5 step 1); a tool that fails either check is routed to
    /// approval rather than into `dispatch_many`, where it would otherwise
    /// still need a permission check.
    async fn classify(&self, ctx: &RequestContext, qualified_tool_name: &str) -> ExecutionClass {
        if !ctx.allows_tool(qualified_tool_name) {
            return ExecutionClass::RequiresApproval;
        }
        match self.manager.is_auto_executable(qualified_tool_name).await {
            Ok(true) => ExecutionClass::Auto,
            Ok(false) => ExecutionClass::RequiresApproval,
            // A tool that fails to resolve at all will fail again, loudly,
            // in `dispatch_many`; treating it as "requires approval" here
            // would silently stall the loop instead of surfacing the error.
            Err(_) => ExecutionClass::Auto,
        }
    }
}

fn tool_results_turn(results: &[ToolResult]) -> ConversationTurn {
    ConversationTurn {
        role: TurnRole::Tool,
        content: String::new(),
        tool_calls: vec![],
        tool_results: results.to_vec(),
    }
}
