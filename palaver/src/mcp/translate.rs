//! Back-propagation of tool responses into history updates.

use chrono::Utc;

use super::McpResponse;
use crate::history::{History, InternalUpdates, Message, TOOL_UPDATED_PREFIX};

/// Translates harvested responses into an update document: a positional
/// overwrite of each hosting Agent message with the new tool state, plus a
/// transient `#toolupdated#` note when the hosting message is no longer the
/// channel tail. Artifact updates from introspective tools are merged in.
///
/// Calls that cannot be located are skipped silently (tools may respond
/// after a history rewrite).
pub fn updates_from_responses(history: &History, responses: &[McpResponse]) -> InternalUpdates {
    let mut updates = InternalUpdates::default();
    let ids: Vec<&str> = responses.iter().map(McpResponse::tool_call_id).collect();
    let located = history.locate_tool_calls(&ids);

    for response in responses {
        let call_id = response.tool_call_id();
        let Some((channel_id, index)) = located.get(call_id) else {
            continue;
        };
        let channel = &history.channels[channel_id];
        let mut message = channel.messages[*index].clone();
        if let Message::Agent { tool_states, .. } = &mut message {
            if let Some(state) = tool_states.get_mut(call_id) {
                state.internal_status = response.status.internal();
                state.content = Some(response.tool_message.content.clone());
            }
        }
        updates
            .channel(channel_id.clone())
            .message_updates
            .insert(*index, message);

        if index + 1 != channel.messages.len() {
            let mut date = Utc::now();
            if let Some(tail) = channel.messages.last() {
                if date < tail.date() {
                    date = tail.date();
                }
            }
            updates
                .channel(channel_id.clone())
                .new_messages
                .push(Message::system_with_lifespan(
                    format!("{TOOL_UPDATED_PREFIX}{call_id}"),
                    date,
                    1,
                ));
        }

        if let Some(extra) = &response.updates {
            updates.merge(extra.clone());
        }
    }
    updates
}
