//! Tool scheduling: reactive discovery, MCP submission, quick-wait harvest.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::Services;
use crate::error::RuntimeError;
use crate::graph::{Command, RunContext, Stage};
use crate::history::{HistoryUpdate, InternalStatus};
use crate::mcp::{updates_from_responses, McpRequest};
use crate::state::{Delta, PipelineState};

pub struct ToolsStage {
    services: Arc<Services>,
}

impl ToolsStage {
    pub const ID: &'static str = "tools";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for ToolsStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let (reactive, mut updates) = state.history.find_reactive_tool_calls();
        let confirmed: Vec<McpRequest> = reactive
            .into_iter()
            .filter(|(_, tool_state)| tool_state.internal_status == InternalStatus::Confirmed)
            .map(|(call, _)| McpRequest::new(call))
            .collect();

        if !confirmed.is_empty() {
            debug!(count = confirmed.len(), "submitting confirmed tool calls");
            let thread_id = ctx.thread_id().unwrap_or("default").to_string();
            // Introspective tools get the history snapshot through the
            // local context.
            let local_context = json!({ "history": state.history });
            self.services
                .mcp
                .add_requests(&thread_id, confirmed, Some(local_context))
                .await;
            let responses = self
                .services
                .mcp
                .get_responses(&thread_id, self.services.knobs.quick_response_time)
                .await;
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
    use crate::graph::Reducer;
    use crate::history::{History, InternalUpdates, Message, ToolCall, ToolUpdate};
    use crate::memory::RunConfig;
    use crate::stages::testing::{test_services_with, ServicesTuning};
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

    fn seeded(confirm: bool) -> PipelineState {
        let mut updates = InternalUpdates::default();
        updates.current_channel = Some("c1".into());
        updates.channel("c1").new_messages = vec![
            Message::human("ro", "do x", at(100)),
            Message::agent(
                "on it",
                at(101),
                "conversing",
                vec![ToolCall::new("t1", "x", serde_json::json!({}))],
            ),
        ];
        if confirm {
            updates.tool_updates.push(ToolUpdate {
                tool_call_id: "t1".into(),
                internal_status: InternalStatus::Confirmed,
                content: None,
            });
        }
        PipelineState {
            history: History::default()
                .reduce(HistoryUpdate::Updates(updates))
                .unwrap(),
            ..Default::default()
        }
    }

    /// **Scenario**: A confirmed call executes within the quick window
    /// and the folded state shows completed/success with the tool content.
    #[tokio::test]
    async fn confirmed_call_executes() {
        let (services, _env) = test_services_with(ServicesTuning {
            tools: vec![Arc::new(OkTool)],
            ..Default::default()
        });
        let stage = ToolsStage::new(services);
        let state = seeded(true);
        let ctx = RunContext::new(RunConfig::for_thread("t-s1"));
        let command = stage.run(state.clone(), &ctx).await.unwrap();

        let delta = command.update.expect("updates produced");
        let mut folded = state.clone();
        crate::state::PipelineReducer::default()
            .apply(&mut folded, delta)
            .unwrap();
        let Message::Agent { tool_states, .. } = &folded.history.channels["c1"].messages[1] else {
            panic!("expected agent");
        };
        assert_eq!(tool_states["t1"].internal_status, InternalStatus::Completed);
        assert_eq!(
            tool_states["t1"].external_status(),
            crate::history::ExternalStatus::Success
        );
        assert_eq!(tool_states["t1"].content.as_deref(), Some("ok"));
        // The agent message is last: no transient note.
        assert_eq!(folded.history.channels["c1"].messages.len(), 2);
    }

    /// **Scenario**: Unconfirmed calls are not submitted; only the reactive
    /// watermark moves.
    #[tokio::test]
    async fn unconfirmed_not_submitted() {
        let (services, _env) = test_services_with(ServicesTuning {
            tools: vec![Arc::new(OkTool)],
            ..Default::default()
        });
        let stage = ToolsStage::new(services);
        let state = seeded(false);
        let ctx = RunContext::new(RunConfig::for_thread("t-s1b"));
        let command = stage.run(state.clone(), &ctx).await.unwrap();

        let delta = command.update.expect("watermark update");
        let mut folded = state;
        crate::state::PipelineReducer::default()
            .apply(&mut folded, delta)
            .unwrap();
        let channel = &folded.history.channels["c1"];
        assert_eq!(channel.no_reactive_tool_call_before, Some(at(100)));
        let Message::Agent { tool_states, .. } = &channel.messages[1] else {
            panic!("expected agent");
        };
        assert_eq!(
            tool_states["t1"].internal_status,
            InternalStatus::Unconfirmed
        );
    }

    /// **Scenario**: An empty history produces no update at all.
    #[tokio::test]
    async fn empty_history_no_update() {
        let (services, _env) = test_services_with(ServicesTuning::default());
        let stage = ToolsStage::new(services);
        let ctx = RunContext::new(RunConfig::default());
        let command = stage.run(PipelineState::default(), &ctx).await.unwrap();
        assert!(command.update.is_none());
    }
}
