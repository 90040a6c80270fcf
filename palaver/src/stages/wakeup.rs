//! Wake-up router: pick the target channel, fire its wake-up URL if the
//! channel stayed quiet, clear the input.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::Services;
use crate::error::RuntimeError;
use crate::graph::{Command, RunContext, Stage};
use crate::history::{Channel, History, Message, WakeUp};
use crate::state::{Delta, PipelineState};

/// How far back a user's last message still binds a wake-up to its channel.
const USER_RECENCY_WINDOW_DAYS: i64 = 2;

pub struct WakeupStage {
    services: Arc<Services>,
}

impl WakeupStage {
    pub const ID: &'static str = "wakeup";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Target selection: (a) the channel holding the user's most recent
    /// human message within the window, else (b) the named channel, else
    /// (c) the current channel.
    fn select_channel<'h>(history: &'h History, wakeup: &WakeUp) -> Option<&'h Channel> {
        if let Some(user_name) = &wakeup.user_name {
            let cutoff = Utc::now() - Duration::days(USER_RECENCY_WINDOW_DAYS);
            let mut best: Option<(&Channel, chrono::DateTime<Utc>)> = None;
            for channel in history.channels.values() {
                for message in channel.messages.iter().rev() {
                    if let Message::Human {
                        author: Some(author),
                        date,
                        ..
                    } = message
                    {
                        if author == user_name && *date >= cutoff {
                            if best.map_or(true, |(_, d)| *date > d) {
                                best = Some((channel, *date));
                            }
                            break;
                        }
                    }
                }
            }
            if let Some((channel, _)) = best {
                return Some(channel);
            }
        }
        if let Some(channel_id) = &wakeup.channel_id {
            if let Some(channel) = history.channels.get(channel_id) {
                return Some(channel);
            }
        }
        history.get_current_channel()
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for WakeupStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        _ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let Some(wakeup) = state.wakeup.clone() else {
            return Ok(Command::end().with_update(Delta::clear_wakeup()));
        };

        if let Some(channel) = Self::select_channel(&state.history, &wakeup) {
            let quiet = channel
                .last_activity
                .map_or(true, |last| last < wakeup.unless_active_since);
            match (&channel.wakeup_url, quiet) {
                (Some(url), true) => {
                    debug!(channel = %channel.id, %url, "firing wake-up url");
                    let http = self.services.http.clone();
                    let url = url.clone();
                    tokio::spawn(async move {
                        if let Err(e) = http.get(&url).send().await {
                            warn!(error = %e, "wake-up url failed");
                        }
                    });
                }
                (Some(_), false) => {
                    debug!(channel = %channel.id, "wake-up suppressed, channel active since")
                }
                (None, _) => debug!(channel = %channel.id, "no wake-up url"),
            }
        }

        Ok(Command::end().with_update(Delta::clear_wakeup()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryUpdate, InternalUpdates};
    use chrono::TimeZone;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn history() -> History {
        let now = Utc::now();
        let mut updates = InternalUpdates::default();
        updates.current_channel = Some("main".into());
        updates.channel("main").new_messages =
            vec![Message::human("ro", "hi", now - Duration::hours(1))];
        updates.channel("dm-ro").new_messages =
            vec![Message::human("ro", "psst", now - Duration::hours(2))];
        updates.channel("old").new_messages =
            vec![Message::human("ro", "ancient", at(1000))];
        History::default()
            .reduce(HistoryUpdate::Updates(updates))
            .unwrap()
    }

    /// **Scenario**: The user's most recent channel within two days wins
    /// over the explicit channel id and the current channel.
    #[test]
    fn selection_prefers_recent_user_message() {
        let history = history();
        let wakeup = WakeUp {
            channel_id: Some("old".into()),
            user_name: Some("ro".into()),
            unless_active_since: Utc::now(),
        };
        let channel = WakeupStage::select_channel(&history, &wakeup).unwrap();
        assert_eq!(channel.id, "main");
    }

    /// **Scenario**: Without a user match the named channel wins; without
    /// either the current channel is used.
    #[test]
    fn selection_fallbacks() {
        let history = history();
        let wakeup = WakeUp {
            channel_id: Some("dm-ro".into()),
            user_name: Some("stranger".into()),
            unless_active_since: Utc::now(),
        };
        assert_eq!(
            WakeupStage::select_channel(&history, &wakeup).unwrap().id,
            "dm-ro"
        );

        let wakeup = WakeUp {
            channel_id: None,
            user_name: None,
            unless_active_since: Utc::now(),
        };
        assert_eq!(
            WakeupStage::select_channel(&history, &wakeup).unwrap().id,
            "main"
        );
    }

    /// **Scenario**: The stage always clears the wake-up and ends its
    /// branch, also when the channel was active since the trigger (no-op
    /// wake-up).
    #[tokio::test]
    async fn clears_wakeup_and_ends() {
        let (services, _env) = crate::stages::testing::test_services();
        let stage = WakeupStage::new(services);
        let mut state = PipelineState {
            history: history(),
            ..Default::default()
        };
        // Active since: last_activity is newer than the trigger's instant.
        state.wakeup = Some(WakeUp {
            channel_id: Some("main".into()),
            user_name: None,
            unless_active_since: Utc::now() - Duration::days(1),
        });
        let ctx = RunContext::new(crate::memory::RunConfig::default());
        let command = stage.run(state, &ctx).await.unwrap();
        assert_eq!(command.goto, crate::graph::Goto::End);
        assert_eq!(command.update.unwrap().wakeup, Some(None));
    }
}
