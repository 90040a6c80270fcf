//! The multi-channel message store and its update reducer.
//!
//! All history mutation goes through [`History::reduce`]: a deterministic
//! fold of update documents that preserves the channel ordering invariants.
//! Disjoint updates commute; a structural failure leaves the store untouched.

mod channel;
mod message;
mod updates;

pub use channel::{Channel, ChannelType, Summary};
pub use message::{
    ExternalStatus, InternalStatus, Message, ToolCall, ToolState, UNCONFIRMED_PLACEHOLDER,
};
pub use updates::{ChannelUpdates, InternalUpdates, ToolUpdate, WakeUp};

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RuntimeError;

/// Marker content prefix for the transient note appended when a tool result
/// lands on a message that is no longer the channel tail.
pub const TOOL_UPDATED_PREFIX: &str = "#toolupdated#";

/// One input to the reducer.
#[derive(Clone, Debug)]
pub enum HistoryUpdate {
    /// Drop everything; produces the empty store.
    Reset,
    /// A full snapshot; adopted only while the store is still empty.
    Replace(History),
    /// A parsed update diff.
    Updates(InternalUpdates),
    /// A raw JSON update document (run input shape); normalized first.
    Document(Value),
}

/// The store: channels keyed by id, plus the channel currently in focus.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_channel: Option<String>,
    #[serde(default)]
    pub channels: BTreeMap<String, Channel>,
}

impl History {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get_current_channel(&self) -> Option<&Channel> {
        self.current_channel
            .as_ref()
            .and_then(|id| self.channels.get(id))
    }

    /// The channel with this id, created lazily on first reference.
    pub fn channel_mut(&mut self, id: &str) -> &mut Channel {
        self.channels
            .entry(id.to_string())
            .or_insert_with(|| Channel::new(id))
    }

    /// Folds one update into the store, returning the next state.
    ///
    /// The receiver is never mutated: a structural error (bad index, bad
    /// document) returns `Err` and the previous state stays authoritative.
    pub fn reduce(&self, update: HistoryUpdate) -> Result<History, RuntimeError> {
        match update {
            HistoryUpdate::Reset => Ok(History::default()),
            HistoryUpdate::Replace(full) => {
                if self.is_empty() {
                    Ok(full)
                } else {
                    // The store is source of truth once populated.
                    debug!("ignoring full-history replace on a populated store");
                    Ok(self.clone())
                }
            }
            HistoryUpdate::Document(document) => {
                let updates = InternalUpdates::from_document(document)?;
                self.reduce(HistoryUpdate::Updates(updates))
            }
            HistoryUpdate::Updates(updates) => {
                let mut next = self.clone();
                next.apply(&updates)?;
                Ok(next)
            }
        }
    }

    fn apply(&mut self, updates: &InternalUpdates) -> Result<(), RuntimeError> {
        for (channel_id, slice) in &updates.channel_updates {
            self.apply_channel(channel_id, slice)?;
        }
        if let Some(current) = &updates.current_channel {
            self.current_channel = Some(current.clone());
        }
        for tool_update in &updates.tool_updates {
            self.apply_tool_update(tool_update);
        }
        Ok(())
    }

    /// Applies one channel slice in the fixed order that preserves the
    /// ordering invariants: metadata, positional updates, deletes, left
    /// appends, appends, activity refresh, summaries.
    fn apply_channel(&mut self, channel_id: &str, slice: &ChannelUpdates) -> Result<(), RuntimeError> {
        let channel = self.channel_mut(channel_id);

        if let Some(name) = &slice.name {
            channel.name = name.clone();
        }
        if let Some(channel_type) = slice.channel_type {
            channel.channel_type = channel_type;
        }
        if let Some(wakeup_url) = &slice.wakeup_url {
            channel.wakeup_url = Some(wakeup_url.clone());
        }
        if let Some(watermark) = slice.no_reactive_tool_call_before {
            channel.no_reactive_tool_call_before = Some(watermark);
        }
        if let Some(watermark) = slice.no_temporary_message_before {
            channel.no_temporary_message_before = Some(watermark);
        }

        // Last-writer-wins per index is given by the BTreeMap key.
        for (&index, message) in &slice.message_updates {
            channel.update_message(index, message.clone())?;
        }

        channel.delete_messages(&slice.message_deletes);
        if let Some(cutoff) = slice.delete_before {
            channel.delete_before(cutoff);
        }

        for message in &slice.message_append_left {
            channel.append_left(message.clone());
        }

        channel.append(slice.new_messages.clone());
        for message in slice
            .new_messages
            .iter()
            .chain(&slice.message_append_left)
        {
            channel.touch(message.date());
        }

        for summary in &slice.new_summaries {
            channel.insert_summary(summary.clone());
        }
        Ok(())
    }

    /// Locates the call and mutates its state. A missing id is skipped
    /// silently: tools may respond out of order or after history rewrites.
    fn apply_tool_update(&mut self, update: &ToolUpdate) {
        let located = self.locate_tool_calls(&[update.tool_call_id.as_str()]);
        let Some((channel_id, index)) = located.get(update.tool_call_id.as_str()).cloned() else {
            warn!(tool_call_id = %update.tool_call_id, "tool update for unknown call, skipping");
            return;
        };
        let channel = self.channel_mut(&channel_id);
        let is_last = index + 1 == channel.messages.len();
        if let Some(Message::Agent { tool_states, .. }) = channel.messages.get_mut(index) {
            if let Some(state) = tool_states.get_mut(&update.tool_call_id) {
                state.internal_status = update.internal_status;
                if update.content.is_some() {
                    state.content = update.content.clone();
                }
            }
        }
        if !is_last {
            // A transient note so the agent notices the late result.
            let tail_date = channel.messages.last().map(Message::date);
            let mut date = Utc::now();
            if let Some(tail) = tail_date {
                if date < tail {
                    date = tail;
                }
            }
            channel.append(vec![Message::system_with_lifespan(
                format!("{TOOL_UPDATED_PREFIX}{}", update.tool_call_id),
                date,
                1,
            )]);
            channel.touch(date);
        }
    }

    /// Finds the hosting `(channel_id, message_index)` for each id.
    ///
    /// Search order: current channel first, then the remaining channels by
    /// `last_activity` strictly descending (ties broken by id so the scan is
    /// deterministic). Each channel is visited once.
    pub fn locate_tool_calls(&self, ids: &[&str]) -> BTreeMap<String, (String, usize)> {
        let mut found: BTreeMap<String, (String, usize)> = BTreeMap::new();
        if ids.is_empty() {
            return found;
        }

        let mut frontier: Vec<&Channel> = Vec::new();
        if let Some(current) = self.get_current_channel() {
            frontier.push(current);
        }
        let mut rest: Vec<&Channel> = self
            .channels
            .values()
            .filter(|c| Some(&c.id) != self.current_channel.as_ref())
            .collect();
        rest.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.id.cmp(&b.id))
        });
        frontier.extend(rest);

        for channel in frontier {
            if found.len() == ids.len() {
                break;
            }
            for (index, message) in channel.messages.iter().enumerate() {
                if let Message::Agent { tool_states, .. } = message {
                    for id in ids {
                        if !found.contains_key(*id) && tool_states.contains_key(*id) {
                            found.insert((*id).to_string(), (channel.id.clone(), index));
                        }
                    }
                }
            }
        }
        found
    }

    /// Walks each channel tail-first collecting tool calls still awaiting
    /// action (`confirmed` or `unconfirmed`), bounded by the channel's
    /// reactive watermark. Returns the calls plus a watermark-only diff.
    pub fn find_reactive_tool_calls(&self) -> (Vec<(ToolCall, ToolState)>, InternalUpdates) {
        let mut reactive: Vec<(ToolCall, ToolState)> = Vec::new();
        let mut updates = InternalUpdates::default();

        for channel in self.channels.values() {
            let Some(last) = channel.messages.last() else {
                continue;
            };
            let watermark = channel.no_reactive_tool_call_before;
            if watermark.is_some_and(|w| last.date() <= w) {
                continue;
            }

            let mut new_watermark = last.date();
            let mut collected_any = false;
            for message in channel.messages.iter().rev() {
                if watermark.is_some_and(|w| message.date() < w) {
                    break;
                }
                if let Message::Agent {
                    tool_calls,
                    tool_states,
                    ..
                } = message
                {
                    let mut collected_here = false;
                    for call in tool_calls {
                        let Some(state) = tool_states.get(&call.id) else {
                            continue;
                        };
                        if state.internal_status.is_reactive() {
                            reactive.push((call.clone(), state.clone()));
                            collected_here = true;
                        }
                    }
                    if collected_here {
                        collected_any = true;
                        // Recheck this message on the next pass.
                        new_watermark = message.date() - chrono::Duration::seconds(1);
                    }
                }
            }
            if !collected_any {
                new_watermark = last.date();
            }
            updates.channel(&channel.id).no_reactive_tool_call_before = Some(new_watermark);
        }
        (reactive, updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn seeded() -> History {
        let mut updates = InternalUpdates::default();
        updates.current_channel = Some("c1".into());
        updates.channel("c1").new_messages = vec![
            Message::human("ro", "do x", at(100)),
            Message::agent(
                "on it",
                at(101),
                "conversing",
                vec![ToolCall::new("t1", "x", json!({}))],
            ),
        ];
        History::default()
            .reduce(HistoryUpdate::Updates(updates))
            .unwrap()
    }

    /// **Scenario**: Reset produces the empty store regardless of prior state.
    #[test]
    fn reset_always_empties() {
        let history = seeded();
        let reset = history.reduce(HistoryUpdate::Reset).unwrap();
        assert!(reset.is_empty());
        assert!(reset.current_channel.is_none());
    }

    /// **Scenario**: A full snapshot replaces an empty store but is ignored
    /// once the store is populated.
    #[test]
    fn replace_only_when_empty() {
        let snapshot = seeded();
        let adopted = History::default()
            .reduce(HistoryUpdate::Replace(snapshot.clone()))
            .unwrap();
        assert_eq!(adopted, snapshot);

        let mut other = InternalUpdates::default();
        other.channel("c9").new_messages = vec![Message::human("x", "hi", at(5))];
        let populated = History::default()
            .reduce(HistoryUpdate::Updates(other))
            .unwrap();
        let kept = populated
            .reduce(HistoryUpdate::Replace(snapshot))
            .unwrap();
        assert_eq!(kept, populated);
    }

    /// **Scenario**: Two disjoint diffs commute (invariant 7).
    #[test]
    fn disjoint_updates_commute() {
        let mut a = InternalUpdates::default();
        a.channel("c1").new_messages = vec![Message::human("ro", "one", at(10))];
        let mut b = InternalUpdates::default();
        b.channel("c2").new_messages = vec![Message::human("mi", "two", at(20))];

        let ab = History::default()
            .reduce(HistoryUpdate::Updates(a.clone()))
            .unwrap()
            .reduce(HistoryUpdate::Updates(b.clone()))
            .unwrap();
        let ba = History::default()
            .reduce(HistoryUpdate::Updates(b))
            .unwrap()
            .reduce(HistoryUpdate::Updates(a))
            .unwrap();
        assert_eq!(ab, ba);
    }

    /// **Scenario**: The same positional update applied twice is idempotent.
    #[test]
    fn positional_update_idempotent() {
        let history = seeded();
        let mut updates = InternalUpdates::default();
        updates
            .channel("c1")
            .message_updates
            .insert(0, Message::human("ro", "do x (edited)", at(999)));
        let once = history.reduce(HistoryUpdate::Updates(updates.clone())).unwrap();
        let twice = once.reduce(HistoryUpdate::Updates(updates)).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.channels["c1"].messages[0].date(), at(100));
    }

    /// **Scenario**: A bad positional index fails and the original store is
    /// left untouched.
    #[test]
    fn bad_index_is_structural_and_non_mutating() {
        let history = seeded();
        let mut updates = InternalUpdates::default();
        updates
            .channel("c1")
            .message_updates
            .insert(9, Message::human("ro", "x", at(0)));
        let err = history.reduce(HistoryUpdate::Updates(updates)).unwrap_err();
        assert!(matches!(err, RuntimeError::IndexOutOfRange { index: 9, .. }));
        assert_eq!(history, seeded());
    }

    /// **Scenario**: `delete_before` is idempotent for a fixed cutoff.
    #[test]
    fn delete_before_idempotent() {
        let history = seeded();
        let mut updates = InternalUpdates::default();
        updates.channel("c1").delete_before = Some(at(101));
        let once = history.reduce(HistoryUpdate::Updates(updates.clone())).unwrap();
        let twice = once.reduce(HistoryUpdate::Updates(updates)).unwrap();
        assert_eq!(once.channels["c1"].messages.len(), 1);
        // max_summary_date resets to "now" on both passes; compare messages.
        assert_eq!(once.channels["c1"].messages, twice.channels["c1"].messages);
    }

    /// **Scenario**: A tool update on the tail message mutates the state in
    /// place and appends no transient note.
    #[test]
    fn tool_update_on_tail_no_transient() {
        let history = seeded();
        let mut updates = InternalUpdates::default();
        updates.tool_updates.push(ToolUpdate {
            tool_call_id: "t1".into(),
            internal_status: InternalStatus::Confirmed,
            content: None,
        });
        let next = history.reduce(HistoryUpdate::Updates(updates)).unwrap();
        let channel = &next.channels["c1"];
        assert_eq!(channel.messages.len(), 2);
        let Message::Agent { tool_states, .. } = &channel.messages[1] else {
            panic!("expected Agent tail");
        };
        assert_eq!(
            tool_states["t1"].internal_status,
            InternalStatus::Confirmed
        );
        // Content was not provided, placeholder survives.
        assert_eq!(
            tool_states["t1"].content.as_deref(),
            Some(UNCONFIRMED_PLACEHOLDER)
        );
    }

    /// **Scenario**: A tool update behind the tail appends a lifespan-1
    /// `#toolupdated#` note dated no earlier than the tail.
    #[test]
    fn tool_update_behind_tail_appends_transient() {
        let mut history = seeded();
        let mut updates = InternalUpdates::default();
        updates.channel("c1").new_messages = vec![Message::human("ro", "anything else?", at(200))];
        history = history.reduce(HistoryUpdate::Updates(updates)).unwrap();

        let mut updates = InternalUpdates::default();
        updates.tool_updates.push(ToolUpdate {
            tool_call_id: "t1".into(),
            internal_status: InternalStatus::Completed,
            content: Some("ok".into()),
        });
        let next = history.reduce(HistoryUpdate::Updates(updates)).unwrap();
        let channel = &next.channels["c1"];
        let tail = channel.messages.last().unwrap();
        assert_eq!(tail.content(), "#toolupdated#t1");
        assert!(matches!(
            tail,
            Message::System {
                lifespan: Some(1),
                ..
            }
        ));
        assert!(tail.date() >= at(200));
    }

    /// **Scenario**: An unknown tool_call_id is silently skipped.
    #[test]
    fn unknown_tool_update_skipped() {
        let history = seeded();
        let mut updates = InternalUpdates::default();
        updates.tool_updates.push(ToolUpdate {
            tool_call_id: "ghost".into(),
            internal_status: InternalStatus::Completed,
            content: Some("ok".into()),
        });
        let next = history.reduce(HistoryUpdate::Updates(updates)).unwrap();
        assert_eq!(next, history);
    }

    /// **Scenario**: locate searches the current channel first, then the
    /// remaining channels by last_activity descending.
    #[test]
    fn locate_order_current_then_recency() {
        let mut history = History::default();
        for (id, secs, call) in [("a", 50, "ta"), ("b", 300, "tb"), ("c", 200, "tc")] {
            let mut updates = InternalUpdates::default();
            updates.channel(id).new_messages = vec![Message::agent(
                "m",
                at(secs),
                "conversing",
                vec![ToolCall::new(call, "x", json!({}))],
            )];
            history = history.reduce(HistoryUpdate::Updates(updates)).unwrap();
        }
        history.current_channel = Some("a".into());

        let found = history.locate_tool_calls(&["ta", "tb", "tc"]);
        assert_eq!(found["ta"], ("a".to_string(), 0));
        assert_eq!(found["tb"], ("b".to_string(), 0));
        assert_eq!(found["tc"], ("c".to_string(), 0));
        assert!(history.locate_tool_calls(&["ghost"]).is_empty());
    }

    /// **Scenario**: Reactive discovery on an empty store returns no calls
    /// and no updates.
    #[test]
    fn reactive_on_empty_history() {
        let (calls, updates) = History::default().find_reactive_tool_calls();
        assert!(calls.is_empty());
        assert!(updates.is_empty());
    }

    /// **Scenario**: Reactive discovery collects unconfirmed calls and moves
    /// the watermark one second before the hosting message.
    #[test]
    fn reactive_collects_and_watermarks() {
        let history = seeded();
        let (calls, updates) = history.find_reactive_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.id, "t1");
        let watermark = updates.channel_updates["c1"]
            .no_reactive_tool_call_before
            .unwrap();
        assert_eq!(watermark, at(100)); // agent message at 101, minus 1s
    }

    /// **Scenario**: With no reactive calls the watermark advances to the
    /// last message date, so the channel is skipped next pass.
    #[test]
    fn reactive_watermark_advances_when_quiet() {
        let history = seeded();
        let confirmed = {
            let mut updates = InternalUpdates::default();
            updates.tool_updates.push(ToolUpdate {
                tool_call_id: "t1".into(),
                internal_status: InternalStatus::Completed,
                content: Some("done".into()),
            });
            history.reduce(HistoryUpdate::Updates(updates)).unwrap()
        };
        let (calls, updates) = confirmed.find_reactive_tool_calls();
        assert!(calls.is_empty());
        let watermark = updates.channel_updates["c1"]
            .no_reactive_tool_call_before
            .unwrap();
        assert_eq!(watermark, at(101));

        let stamped = confirmed.reduce(HistoryUpdate::Updates(updates)).unwrap();
        let (calls, updates) = stamped.find_reactive_tool_calls();
        assert!(calls.is_empty());
        assert!(updates.is_empty());
    }

    /// **Scenario**: Serializing and re-parsing a History yields structurally
    /// equal state.
    #[test]
    fn serde_round_trip() {
        let mut history = seeded();
        history
            .channel_mut("c1")
            .insert_summary(Summary::new(at(0), at(50), "earlier chatter"));
        let json = serde_json::to_string(&history).unwrap();
        let back: History = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }
}
