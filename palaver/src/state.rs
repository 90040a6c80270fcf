//! Pipeline state: the one document checkpointed per thread, plus the
//! partial-update type stages emit and the per-field reducer that folds it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::graph::{Merge, Reducer};
use crate::history::{History, HistoryUpdate, InternalUpdates, WakeUp};

/// Chat-subgraph mode when nothing special is going on.
pub const REGULAR_MODE: &str = "regular";
/// Chat-subgraph mode that runs vision before everything else.
pub const VISION_MODE: &str = "vision";
/// Chat-subgraph mode for runs with no fresh human input.
pub const IDLE_MODE: &str = "idle";
/// The activity meaning "the agent will not speak this turn".
pub const WAITING: &str = "waiting";

/// Checkpointed state for one conversation thread.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Current behavior profile; empty means "use the default".
    #[serde(default)]
    pub activity: String,
    /// Chat-subgraph mode for this run (regular / vision / idle).
    #[serde(default)]
    pub internal_activity: String,
    #[serde(default)]
    pub history: History,
    /// Pending wake-up input, consumed by the wakeup stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wakeup: Option<WakeUp>,
    /// When the summarizer last looked at the channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summary_check: Option<DateTime<Utc>>,
    /// Updates accumulated during the run, applied by cleanup.
    #[serde(default)]
    pub internal_updates: InternalUpdates,
}

impl PipelineState {
    pub fn is_waiting(&self) -> bool {
        self.activity == WAITING
    }
}

/// Accumulator delta for the `internal_updates` field.
///
/// The algebra is closed under sequencing, so deltas from an embedded
/// subgraph can be merged before they reach the outer state.
#[derive(Clone, Debug)]
pub enum UpdatesDelta {
    /// Clear the accumulator.
    Reset,
    /// Merge into the accumulator.
    Add(InternalUpdates),
    /// Replace the accumulator (a reset followed by an add).
    Replace(InternalUpdates),
}

impl UpdatesDelta {
    /// Sequences `self` then `other` into one delta.
    fn then(self, other: UpdatesDelta) -> UpdatesDelta {
        match (self, other) {
            (_, UpdatesDelta::Reset) => UpdatesDelta::Reset,
            (_, UpdatesDelta::Replace(updates)) => UpdatesDelta::Replace(updates),
            (UpdatesDelta::Reset, UpdatesDelta::Add(updates)) => UpdatesDelta::Replace(updates),
            (UpdatesDelta::Add(mut a), UpdatesDelta::Add(b)) => {
                a.merge(b);
                UpdatesDelta::Add(a)
            }
            (UpdatesDelta::Replace(mut a), UpdatesDelta::Add(b)) => {
                a.merge(b);
                UpdatesDelta::Replace(a)
            }
        }
    }
}

/// Partial-state update emitted by a stage. Absent fields are untouched.
#[derive(Clone, Debug, Default)]
pub struct Delta {
    pub activity: Option<String>,
    pub internal_activity: Option<String>,
    pub history: Option<HistoryUpdate>,
    pub internal_updates: Option<UpdatesDelta>,
    /// `Some(None)` clears the wake-up; `Some(Some(_))` replaces it.
    pub wakeup: Option<Option<WakeUp>>,
    pub last_summary_check: Option<DateTime<Utc>>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activity(name: impl Into<String>) -> Self {
        Self {
            activity: Some(name.into()),
            ..Default::default()
        }
    }

    /// Accumulate updates for the cleanup stage to apply.
    pub fn accumulate(updates: InternalUpdates) -> Self {
        Self {
            internal_updates: Some(UpdatesDelta::Add(updates)),
            ..Default::default()
        }
    }

    pub fn reset_updates() -> Self {
        Self {
            internal_updates: Some(UpdatesDelta::Reset),
            ..Default::default()
        }
    }

    pub fn history(update: HistoryUpdate) -> Self {
        Self {
            history: Some(update),
            ..Default::default()
        }
    }

    pub fn clear_wakeup() -> Self {
        Self {
            wakeup: Some(None),
            ..Default::default()
        }
    }

    pub fn with_activity(mut self, name: impl Into<String>) -> Self {
        self.activity = Some(name.into());
        self
    }

    pub fn with_internal_activity(mut self, mode: impl Into<String>) -> Self {
        self.internal_activity = Some(mode.into());
        self
    }

    pub fn with_history(mut self, update: HistoryUpdate) -> Self {
        self.history = Some(update);
        self
    }

    pub fn with_last_summary_check(mut self, at: DateTime<Utc>) -> Self {
        self.last_summary_check = Some(at);
        self
    }
}

impl Merge for Delta {
    fn merge(&mut self, other: Self) {
        if other.activity.is_some() {
            self.activity = other.activity;
        }
        if other.internal_activity.is_some() {
            self.internal_activity = other.internal_activity;
        }
        self.history = match (self.history.take(), other.history) {
            (Some(HistoryUpdate::Updates(mut a)), Some(HistoryUpdate::Updates(b))) => {
                a.merge(b);
                Some(HistoryUpdate::Updates(a))
            }
            (current, None) => current,
            (_, replacement) => replacement,
        };
        self.internal_updates = match (self.internal_updates.take(), other.internal_updates) {
            (Some(a), Some(b)) => Some(a.then(b)),
            (current, None) => current,
            (None, incoming) => incoming,
        };
        if other.wakeup.is_some() {
            self.wakeup = other.wakeup;
        }
        if other.last_summary_check.is_some() {
            self.last_summary_check = other.last_summary_check;
        }
    }
}

/// Per-field reducer for [`PipelineState`].
///
/// * `activity`: last-writer-wins for non-empty values, defaulted when the
///   state carries none.
/// * `internal_activity`: last-writer-wins; an explicit empty write resets
///   to `regular`.
/// * `history`: folded through [`History::reduce`].
/// * `internal_updates`: the [`UpdatesDelta`] accumulator algebra.
/// * `wakeup`: replaced atomically.
/// * `last_summary_check`: last-writer-wins.
pub struct PipelineReducer {
    pub default_activity: String,
}

impl PipelineReducer {
    pub fn new(default_activity: impl Into<String>) -> Self {
        Self {
            default_activity: default_activity.into(),
        }
    }
}

impl Default for PipelineReducer {
    fn default() -> Self {
        Self::new("conversing")
    }
}

impl Reducer<PipelineState, Delta> for PipelineReducer {
    fn apply(&self, state: &mut PipelineState, delta: Delta) -> Result<(), RuntimeError> {
        if let Some(activity) = delta.activity {
            if !activity.is_empty() {
                state.activity = activity;
            }
        }
        if state.activity.is_empty() {
            state.activity = self.default_activity.clone();
        }

        if let Some(mode) = delta.internal_activity {
            state.internal_activity = if mode.is_empty() {
                REGULAR_MODE.to_string()
            } else {
                mode
            };
        }
        if state.internal_activity.is_empty() {
            state.internal_activity = REGULAR_MODE.to_string();
        }

        if let Some(update) = delta.history {
            state.history = state.history.reduce(update)?;
        }

        match delta.internal_updates {
            Some(UpdatesDelta::Reset) => state.internal_updates = InternalUpdates::default(),
            Some(UpdatesDelta::Add(updates)) => state.internal_updates.merge(updates),
            Some(UpdatesDelta::Replace(updates)) => state.internal_updates = updates,
            None => {}
        }

        if let Some(wakeup) = delta.wakeup {
            state.wakeup = wakeup;
        }
        if let Some(at) = delta.last_summary_check {
            state.last_summary_check = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Message;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn apply(state: &mut PipelineState, delta: Delta) {
        PipelineReducer::default().apply(state, delta).unwrap();
    }

    /// **Scenario**: Empty activity writes are ignored and the default fills
    /// an empty state; non-empty writes win.
    #[test]
    fn activity_lww_nonempty_with_default() {
        let mut state = PipelineState::default();
        apply(&mut state, Delta::new());
        assert_eq!(state.activity, "conversing");
        apply(&mut state, Delta::activity("debug"));
        assert_eq!(state.activity, "debug");
        apply(&mut state, Delta::new().with_activity(""));
        assert_eq!(state.activity, "debug");
    }

    /// **Scenario**: An explicit empty internal_activity resets to regular.
    #[test]
    fn internal_activity_reset() {
        let mut state = PipelineState::default();
        apply(&mut state, Delta::new().with_internal_activity(VISION_MODE));
        assert_eq!(state.internal_activity, VISION_MODE);
        apply(&mut state, Delta::new().with_internal_activity(""));
        assert_eq!(state.internal_activity, REGULAR_MODE);
    }

    /// **Scenario**: The updates accumulator merges adds and clears on the
    /// reset sentinel.
    #[test]
    fn updates_accumulator() {
        let mut state = PipelineState::default();
        let mut first = InternalUpdates::default();
        first.channel("c1").new_messages = vec![Message::human("ro", "one", at(1))];
        let mut second = InternalUpdates::default();
        second.channel("c1").new_messages = vec![Message::human("ro", "two", at(2))];

        apply(&mut state, Delta::accumulate(first));
        apply(&mut state, Delta::accumulate(second));
        assert_eq!(state.internal_updates.channel_updates["c1"].new_messages.len(), 2);

        apply(&mut state, Delta::reset_updates());
        assert!(state.internal_updates.is_empty());
    }

    /// **Scenario**: The delta merge sequences the accumulator algebra:
    /// reset-then-add collapses to replace.
    #[test]
    fn delta_merge_sequences_updates() {
        let mut updates = InternalUpdates::default();
        updates.channel("c1").new_messages = vec![Message::human("ro", "x", at(1))];

        let mut delta = Delta::reset_updates();
        delta.merge(Delta::accumulate(updates.clone()));
        assert!(matches!(
            delta.internal_updates,
            Some(UpdatesDelta::Replace(_))
        ));

        // Applying to a state with prior accumulation drops the old content.
        let mut state = PipelineState::default();
        let mut stale = InternalUpdates::default();
        stale.channel("c9").new_messages = vec![Message::human("zu", "stale", at(0))];
        apply(&mut state, Delta::accumulate(stale));
        apply(&mut state, delta);
        assert!(!state.internal_updates.channel_updates.contains_key("c9"));
        assert!(state.internal_updates.channel_updates.contains_key("c1"));
    }

    /// **Scenario**: History deltas merge field-wise when both are update
    /// diffs; a reset replaces.
    #[test]
    fn delta_merge_history() {
        let mut a = InternalUpdates::default();
        a.channel("c1").new_messages = vec![Message::human("ro", "1", at(1))];
        let mut b = InternalUpdates::default();
        b.channel("c2").new_messages = vec![Message::human("mi", "2", at(2))];

        let mut delta = Delta::history(HistoryUpdate::Updates(a));
        delta.merge(Delta::history(HistoryUpdate::Updates(b)));
        match &delta.history {
            Some(HistoryUpdate::Updates(merged)) => {
                assert!(merged.channel_updates.contains_key("c1"));
                assert!(merged.channel_updates.contains_key("c2"));
            }
            other => panic!("expected merged updates, got {other:?}"),
        }

        delta.merge(Delta::history(HistoryUpdate::Reset));
        assert!(matches!(delta.history, Some(HistoryUpdate::Reset)));
    }

    /// **Scenario**: Wakeup replaces atomically, including the clear form.
    #[test]
    fn wakeup_replacement() {
        let mut state = PipelineState::default();
        let wakeup = WakeUp {
            channel_id: Some("c1".into()),
            user_name: None,
            unless_active_since: at(10),
        };
        apply(
            &mut state,
            Delta {
                wakeup: Some(Some(wakeup.clone())),
                ..Default::default()
            },
        );
        assert_eq!(state.wakeup.as_ref(), Some(&wakeup));
        apply(&mut state, Delta::clear_wakeup());
        assert!(state.wakeup.is_none());
    }

    /// **Scenario**: The state round-trips through serde (checkpoint shape).
    #[test]
    fn state_serde_round_trip() {
        let mut state = PipelineState::default();
        apply(&mut state, Delta::activity("conversing"));
        let mut updates = InternalUpdates::default();
        updates.channel("c1").new_messages = vec![Message::human("ro", "hello", at(5))];
        apply(&mut state, Delta::history(HistoryUpdate::Updates(updates)));
        state.last_summary_check = Some(at(9));

        let json = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
