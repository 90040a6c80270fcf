//! Auto-tools: run unconfirmed calls that opted out of confirmation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::Services;
use crate::error::RuntimeError;
use crate::graph::{Command, RunContext, Stage};
use crate::history::{HistoryUpdate, InternalStatus};
use crate::mcp::{updates_from_responses, McpRequest, McpStatus};
use crate::state::{Delta, PipelineState};

pub struct AutoToolsStage {
    services: Arc<Services>,
}

impl AutoToolsStage {
    pub const ID: &'static str = "autotools";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for AutoToolsStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let (reactive, mut updates) = state.history.find_reactive_tool_calls();
        let auto: Vec<McpRequest> = reactive
            .into_iter()
            .filter(|(call, tool_state)| {
                tool_state.internal_status == InternalStatus::Unconfirmed
                    && call.skips_confirmation()
            })
            .map(|(call, _)| McpRequest::new(call))
            .collect();

        if !auto.is_empty() {
            debug!(count = auto.len(), "running pre-authorized tool calls");
            let thread_id = ctx.thread_id().unwrap_or("default").to_string();
            let local_context = json!({ "history": state.history });
            self.services
                .mcp
                .add_requests(&thread_id, auto, Some(local_context))
                .await;
            let responses = self
                .services
                .mcp
                .get_responses(&thread_id, self.services.knobs.quick_response_time)
                .await;
            // Downstream effects of finished tools need another pass.
            if responses
                .iter()
                .any(|r| matches!(r.status, McpStatus::Completed | McpStatus::Failed))
            {
                ctx.emit_directive(directive::Directive::Rerun).await;
            }
            updates.merge(updates_from_responses(&state.history, &responses));
        }

        let update = if updates.is_empty() {
            None
        } else {
            Some(Delta::history(HistoryUpdate::Updates(updates)))
        };
        Ok(Command {
            goto: crate::graph::Goto::Continue,
            update,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{History, InternalUpdates, Message, ToolCall};
    use crate::memory::RunConfig;
    use crate::stages::testing::{test_services_with, ServicesTuning};
    use crate::stream::StreamEvent;
    use crate::tools::{Tool, ToolContext, ToolError, ToolOutput};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    struct OkTool;

    #[async_trait]
    impl Tool for OkTool {
        fn name(&self) -> &str {
            "x"
        }
        fn description(&self) -> &str {
            "returns ok"
        }
        async fn run(&self, _args: &Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text("ok"))
        }
    }

    fn seeded(skip_confirmation: bool) -> PipelineState {
        let args = if skip_confirmation {
            serde_json::json!({"skip_confirmation": true})
        } else {
            serde_json::json!({})
        };
        let mut updates = InternalUpdates::default();
        updates.current_channel = Some("c1".into());
        updates.channel("c1").new_messages = vec![Message::agent(
            "doing it",
            at(100),
            "conversing",
            vec![ToolCall::new("t1", "x", args)],
        )];
        PipelineState {
            history: History::default()
                .reduce(HistoryUpdate::Updates(updates))
                .unwrap(),
            ..Default::default()
        }
    }

    /// **Scenario**: A pre-authorized unconfirmed call runs and `#rerun#` is
    /// emitted for the downstream effects.
    #[tokio::test]
    async fn pre_authorized_runs_and_reruns() {
        let (services, _env) = test_services_with(ServicesTuning {
            tools: vec![Arc::new(OkTool)],
            ..Default::default()
        });
        let stage = AutoToolsStage::new(services);
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let ctx = RunContext::new(RunConfig::for_thread("t-auto")).with_stream(tx, []);
        let command = stage.run(seeded(true), &ctx).await.unwrap();
        drop(ctx);

        let mut saw_rerun = false;
        while let Some(event) = rx.recv().await {
            if matches!(
                event,
                StreamEvent::Directive(directive::Directive::Rerun)
            ) {
                saw_rerun = true;
            }
        }
        assert!(saw_rerun);
        let delta = command.update.unwrap();
        let Some(HistoryUpdate::Updates(updates)) = delta.history else {
            panic!("expected updates");
        };
        let updated = &updates.channel_updates["c1"].message_updates[&0];
        let Message::Agent { tool_states, .. } = updated else {
            panic!("expected agent");
        };
        assert_eq!(tool_states["t1"].internal_status, InternalStatus::Completed);
    }

    /// **Scenario**: Calls still requiring confirmation are left alone.
    #[tokio::test]
    async fn confirmation_required_untouched() {
        let (services, _env) = test_services_with(ServicesTuning {
            tools: vec![Arc::new(OkTool)],
            ..Default::default()
        });
        let stage = AutoToolsStage::new(services);
        let ctx = RunContext::new(RunConfig::for_thread("t-auto2"));
        let command = stage.run(seeded(false), &ctx).await.unwrap();
        let delta = command.update.unwrap();
        let Some(HistoryUpdate::Updates(updates)) = delta.history else {
            panic!("expected updates");
        };
        // Only the watermark moved; no positional updates.
        assert!(updates.channel_updates["c1"].message_updates.is_empty());
    }
}
