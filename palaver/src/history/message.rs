//! Message variants and per-call tool state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder content for a tool call that has not been confirmed yet.
pub const UNCONFIRMED_PLACEHOLDER: &str = "Waiting for user confirmation.";

/// A structured external action requested by the agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// `args.requestor`, when the caller identified the person asking.
    pub fn requestor(&self) -> Option<&str> {
        self.args.get("requestor").and_then(Value::as_str)
    }

    /// True when `args.skip_confirmation == true`.
    pub fn skips_confirmation(&self) -> bool {
        self.args
            .get("skip_confirmation")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// User-gated execution status of one tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalStatus {
    Unconfirmed,
    Confirmed,
    Canceled,
    Rejected,
    Processing,
    Completed,
    Failed,
}

/// Status surfaced to the model: only `completed` maps to success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalStatus {
    Success,
    Error,
}

impl InternalStatus {
    pub fn external(self) -> ExternalStatus {
        match self {
            InternalStatus::Completed => ExternalStatus::Success,
            _ => ExternalStatus::Error,
        }
    }

    /// Terminal states: completed, failed, rejected, canceled.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InternalStatus::Completed
                | InternalStatus::Failed
                | InternalStatus::Rejected
                | InternalStatus::Canceled
        )
    }

    /// States the tools stage may still act on.
    pub fn is_reactive(self) -> bool {
        matches!(self, InternalStatus::Unconfirmed | InternalStatus::Confirmed)
    }
}

/// Per-call record attached to its owning Agent message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    pub internal_status: InternalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ToolState {
    pub fn unconfirmed() -> Self {
        Self {
            internal_status: InternalStatus::Unconfirmed,
            content: Some(UNCONFIRMED_PLACEHOLDER.to_string()),
        }
    }

    pub fn external_status(&self) -> ExternalStatus {
        self.internal_status.external()
    }
}

/// One conversation message.
///
/// Common metadata (content, date) is inlined per variant; the reducer and
/// formatter go through the accessors below instead of matching everywhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Human {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        content: String,
        date: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Agent {
        content: String,
        date: DateTime<Utc>,
        activity: String,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
        #[serde(default)]
        tool_states: BTreeMap<String, ToolState>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        content: String,
        date: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lifespan: Option<u32>,
    },
}

impl Message {
    pub fn human(
        author: impl Into<String>,
        content: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Message::Human {
            message_id: None,
            author: Some(author.into()),
            content: content.into(),
            date,
            summary: None,
        }
    }

    /// Builds an Agent message, giving every tool call a default
    /// `unconfirmed` state: an Agent message whose states are missing is
    /// illegal, so the constructor is the only way the invariant can be kept.
    pub fn agent(
        content: impl Into<String>,
        date: DateTime<Utc>,
        activity: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        let tool_states = tool_calls
            .iter()
            .map(|call| (call.id.clone(), ToolState::unconfirmed()))
            .collect();
        Message::Agent {
            content: content.into(),
            date,
            activity: activity.into(),
            tool_calls,
            tool_states,
            summary: None,
        }
    }

    pub fn system(content: impl Into<String>, date: DateTime<Utc>) -> Self {
        Message::System {
            author: None,
            content: content.into(),
            date,
            lifespan: None,
        }
    }

    pub fn system_with_lifespan(
        content: impl Into<String>,
        date: DateTime<Utc>,
        lifespan: u32,
    ) -> Self {
        Message::System {
            author: None,
            content: content.into(),
            date,
            lifespan: Some(lifespan),
        }
    }

    pub fn date(&self) -> DateTime<Utc> {
        match self {
            Message::Human { date, .. }
            | Message::Agent { date, .. }
            | Message::System { date, .. } => *date,
        }
    }

    pub fn set_date(&mut self, new_date: DateTime<Utc>) {
        match self {
            Message::Human { date, .. }
            | Message::Agent { date, .. }
            | Message::System { date, .. } => *date = new_date,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::Human { content, .. }
            | Message::Agent { content, .. }
            | Message::System { content, .. } => content,
        }
    }

    pub fn set_content(&mut self, new_content: String) {
        match self {
            Message::Human { content, .. }
            | Message::Agent { content, .. }
            | Message::System { content, .. } => *content = new_content,
        }
    }

    /// Condensed form, when one was produced for this message.
    pub fn summary(&self) -> Option<&str> {
        match self {
            Message::Human { summary, .. } | Message::Agent { summary, .. } => summary.as_deref(),
            Message::System { .. } => None,
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, Message::Agent { .. })
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Message::Human { .. })
    }

    /// Re-establishes the one-state-per-call invariant on messages that
    /// arrived from outside (deserialized documents may omit states).
    pub fn ensure_tool_states(&mut self) {
        if let Message::Agent {
            tool_calls,
            tool_states,
            ..
        } = self
        {
            for call in tool_calls.iter() {
                tool_states
                    .entry(call.id.clone())
                    .or_insert_with(ToolState::unconfirmed);
            }
        }
    }
}
