//! Reminder tool: sleep, then hand the reminder text back to the agent.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{Tool, ToolContext, ToolError, ToolOutput};

#[derive(Deserialize)]
struct ReminderArgs {
    seconds: u64,
    message: String,
    // Accepted so the confirmation filter and wake-up routing can read
    // them straight off the call args.
    #[serde(default)]
    #[allow(dead_code)]
    requestor: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    skip_confirmation: bool,
}

/// `setup_reminder{seconds, message, requestor?, skip_confirmation?}`.
///
/// Sleeps for the requested delay on the MCP thread; the completion wake-up
/// then brings the agent back to the reminder content. The natural exercise
/// of the slow-tool path: it outlives every quick-response window.
pub struct ReminderTool;

#[async_trait]
impl Tool for ReminderTool {
    fn name(&self) -> &str {
        "setup_reminder"
    }

    fn description(&self) -> &str {
        "Set up a notification reminded to you after the given number of seconds."
    }

    async fn run(&self, args: &Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args: ReminderArgs = serde_json::from_value(args.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        tokio::time::sleep(std::time::Duration::from_secs(args.seconds)).await;
        Ok(ToolOutput::text(format!(
            "Waited for {}s. Reminder is {}",
            args.seconds, args.message
        )))
    }
}
