//! The update algebra: diff documents folded into History by the reducer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::channel::{ChannelType, Summary};
use super::message::{InternalStatus, Message};
use crate::error::RuntimeError;

/// A status/content mutation addressed at one tool call, located by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolUpdate {
    pub tool_call_id: String,
    pub internal_status: InternalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// An external trigger that runs the pipeline for a channel even without a
/// new user message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WakeUp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub unless_active_since: DateTime<Utc>,
}

/// Per-channel slice of an update document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<ChannelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wakeup_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_messages: Vec<Message>,
    /// Positional overwrites; the stored date wins over the incoming one.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub message_updates: BTreeMap<usize, Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_deletes: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_append_left: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_summaries: Vec<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_reactive_tool_call_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_temporary_message_before: Option<DateTime<Utc>>,
}

impl ChannelUpdates {
    pub fn is_empty(&self) -> bool {
        *self == ChannelUpdates::default()
    }

    /// Field-wise merge for fan-in: lists concatenate, maps merge
    /// (last writer wins per key), scalars last-writer-wins.
    pub fn merge(&mut self, other: ChannelUpdates) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.channel_type.is_some() {
            self.channel_type = other.channel_type;
        }
        if other.wakeup_url.is_some() {
            self.wakeup_url = other.wakeup_url;
        }
        self.new_messages.extend(other.new_messages);
        self.message_updates.extend(other.message_updates);
        self.message_deletes.extend(other.message_deletes);
        self.message_append_left.extend(other.message_append_left);
        self.new_summaries.extend(other.new_summaries);
        if other.delete_before.is_some() {
            self.delete_before = other.delete_before;
        }
        if other.no_reactive_tool_call_before.is_some() {
            self.no_reactive_tool_call_before = other.no_reactive_tool_call_before;
        }
        if other.no_temporary_message_before.is_some() {
            self.no_temporary_message_before = other.no_temporary_message_before;
        }
    }
}

/// A complete diff over the history: channel slices plus tool-state
/// mutations and an optional current-channel switch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_updates: Vec<ToolUpdate>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channel_updates: BTreeMap<String, ChannelUpdates>,
}

impl InternalUpdates {
    pub fn is_empty(&self) -> bool {
        self.current_channel.is_none()
            && self.tool_updates.is_empty()
            && self.channel_updates.values().all(ChannelUpdates::is_empty)
    }

    /// The slice for `channel_id`, created on first reference.
    pub fn channel(&mut self, channel_id: impl Into<String>) -> &mut ChannelUpdates {
        self.channel_updates.entry(channel_id.into()).or_default()
    }

    /// Fan-in merge of two diffs (self, then other).
    pub fn merge(&mut self, other: InternalUpdates) {
        if other.current_channel.is_some() {
            self.current_channel = other.current_channel;
        }
        self.tool_updates.extend(other.tool_updates);
        for (channel_id, updates) in other.channel_updates {
            self.channel(channel_id).merge(updates);
        }
    }

    /// Normalizes a raw JSON document into an update diff, coercing nested
    /// channel slices; run inputs arrive in this shape.
    pub fn from_document(document: Value) -> Result<Self, RuntimeError> {
        serde_json::from_value(document).map_err(|e| RuntimeError::InvalidUpdate(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// **Scenario**: Fan-in merge concatenates lists, merges maps with
    /// last-writer-wins keys, and overwrites scalars.
    #[test]
    fn merge_is_field_wise() {
        let mut left = InternalUpdates::default();
        left.current_channel = Some("c1".into());
        left.channel("c1").new_messages.push(Message::human("a", "1", at(1)));
        left.channel("c1")
            .message_updates
            .insert(0, Message::human("a", "left", at(1)));

        let mut right = InternalUpdates::default();
        right.channel("c1").new_messages.push(Message::human("b", "2", at(2)));
        right
            .channel("c1")
            .message_updates
            .insert(0, Message::human("b", "right", at(2)));
        right.channel("c1").delete_before = Some(at(5));
        right.channel("c2").name = Some("other".into());

        left.merge(right);
        let c1 = &left.channel_updates["c1"];
        assert_eq!(c1.new_messages.len(), 2);
        assert_eq!(c1.message_updates[&0].content(), "right");
        assert_eq!(c1.delete_before, Some(at(5)));
        assert_eq!(
            left.channel_updates["c2"].name.as_deref(),
            Some("other")
        );
        assert_eq!(left.current_channel.as_deref(), Some("c1"));
    }

    /// **Scenario**: A raw run-input document normalizes into the diff type,
    /// with missing fields defaulted.
    #[test]
    fn from_document_coerces_partial_channels() {
        let updates = InternalUpdates::from_document(json!({
            "current_channel": "dm-1",
            "tool_updates": [
                {"tool_call_id": "t1", "internal_status": "confirmed"}
            ],
            "channel_updates": {
                "dm-1": {
                    "name": "DM",
                    "new_messages": [
                        {"kind": "human", "author": "ro", "content": "do x",
                         "date": "2026-01-01T00:00:00Z"}
                    ]
                }
            }
        }))
        .unwrap();
        assert_eq!(updates.current_channel.as_deref(), Some("dm-1"));
        assert_eq!(updates.tool_updates.len(), 1);
        assert_eq!(
            updates.tool_updates[0].internal_status,
            InternalStatus::Confirmed
        );
        let slice = &updates.channel_updates["dm-1"];
        assert_eq!(slice.name.as_deref(), Some("DM"));
        assert_eq!(slice.new_messages.len(), 1);
        assert!(slice.message_updates.is_empty());
    }

    /// **Scenario**: A malformed document is a structural error.
    #[test]
    fn from_document_rejects_garbage() {
        let err = InternalUpdates::from_document(json!({"tool_updates": "nope"})).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidUpdate(_)));
    }

    /// **Scenario**: Emptiness ignores channel slices that carry nothing.
    #[test]
    fn is_empty_sees_through_empty_slices() {
        let mut updates = InternalUpdates::default();
        updates.channel("c1");
        assert!(updates.is_empty());
        updates.channel("c1").delete_before = Some(at(1));
        assert!(!updates.is_empty());
    }
}
