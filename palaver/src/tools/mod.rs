//! Tool seam and the toolkit that executes calls.
//!
//! Concrete tools are external collaborators; the runtime ships only the
//! trait, the toolkit, and the reminder tool. Failures never escape a tool
//! run: they are captured into an error-status message whose content is the
//! failure trace, surfacing to the agent on the next run.

mod reminder;

pub use reminder::ReminderTool;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::history::{ExternalStatus, ToolCall};

/// Tool execution error, captured into the result message.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

/// Extra context handed to a tool run. `extras` carries whatever the
/// scheduling stage wants introspective tools to see (e.g. the serialized
/// history snapshot under `"history"`).
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    pub extras: Value,
}

/// A tool's successful output: text content plus an optional artifact.
///
/// An artifact with an `updates` key is an update document the MCP thread
/// propagates back through the reducer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub artifact: Option<Value>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Value) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

/// The result of running one call, addressed back to it by id.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolMessage {
    pub tool_call_id: String,
    pub status: ExternalStatus,
    pub content: String,
    pub artifact: Option<Value>,
}

/// One executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn run(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}

/// Named collection of tools; the execution gateway for tool calls.
#[derive(Clone, Default)]
pub struct ToolKit {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolKit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// A toolkit restricted to the named tools; unknown names error.
    pub fn subset<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<ToolKit, ToolError> {
        let mut subset = ToolKit::new();
        for name in names {
            let tool = self
                .tools
                .get(name)
                .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
            subset.register(tool.clone());
        }
        Ok(subset)
    }

    /// One line per tool, for routing prompts.
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Runs one call, capturing any failure into an error-status message.
    pub async fn run_call(&self, call: &ToolCall, ctx: &ToolContext) -> ToolMessage {
        debug!(tool = %call.name, call_id = %call.id, "running tool call");
        let result = match self.tools.get(&call.name) {
            Some(tool) => tool.run(&call.args, ctx).await,
            None => Err(ToolError::UnknownTool(call.name.clone())),
        };
        match result {
            Ok(output) => ToolMessage {
                tool_call_id: call.id.clone(),
                status: ExternalStatus::Success,
                content: output.content,
                artifact: output.artifact,
            },
            Err(e) => ToolMessage {
                tool_call_id: call.id.clone(),
                status: ExternalStatus::Error,
                content: e.to_string(),
                artifact: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes its text argument."
        }
        async fn run(&self, args: &Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            let text = args
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArguments("text required".into()))?;
            Ok(ToolOutput::text(text))
        }
    }

    fn kit() -> ToolKit {
        let mut kit = ToolKit::new();
        kit.register(Arc::new(EchoTool));
        kit
    }

    /// **Scenario**: A successful run yields a success message with the
    /// tool's content.
    #[tokio::test]
    async fn run_call_success() {
        let message = kit()
            .run_call(
                &ToolCall::new("t1", "echo", json!({"text": "hello"})),
                &ToolContext::default(),
            )
            .await;
        assert_eq!(message.status, ExternalStatus::Success);
        assert_eq!(message.content, "hello");
        assert_eq!(message.tool_call_id, "t1");
    }

    /// **Scenario**: Failures (bad args, unknown tool) are captured into an
    /// error-status message instead of propagating.
    #[tokio::test]
    async fn run_call_captures_failures() {
        let bad_args = kit()
            .run_call(
                &ToolCall::new("t1", "echo", json!({})),
                &ToolContext::default(),
            )
            .await;
        assert_eq!(bad_args.status, ExternalStatus::Error);
        assert!(bad_args.content.contains("text required"));

        let unknown = kit()
            .run_call(
                &ToolCall::new("t2", "ghost", json!({})),
                &ToolContext::default(),
            )
            .await;
        assert_eq!(unknown.status, ExternalStatus::Error);
        assert!(unknown.content.contains("ghost"));
    }

    /// **Scenario**: subset keeps only the named tools and rejects unknowns.
    #[test]
    fn subset_validates_names() {
        let kit = kit();
        let sub = kit.subset(["echo"]).unwrap();
        assert_eq!(sub.names().collect::<Vec<_>>(), vec!["echo"]);
        assert!(matches!(
            kit.subset(["nope"]),
            Err(ToolError::UnknownTool(name)) if name == "nope"
        ));
    }
}
