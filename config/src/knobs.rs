//! Runtime tuning knobs, read from the environment with built-in defaults.

use std::time::Duration;

/// Tuning knobs for the conversation runtime.
///
/// Each field can be overridden through the environment (after
/// [`crate::load_and_apply`]) using the upper-snake-case name, e.g.
/// `SUMMARIZE_SIZE_THRESHOLD=6000`.
#[derive(Clone, Debug, PartialEq)]
pub struct Knobs {
    /// Summarize a message region once its cumulated size exceeds this many
    /// characters.
    pub summarize_size_threshold: usize,
    /// Only messages older than this many days are candidates for
    /// summarization.
    pub summarize_days_ago_threshold: i64,
    /// Maximum number of conversation characters presented to the model.
    pub max_conversation_size: usize,
    /// Maximum size of a channel before old messages are deleted.
    pub channel_size_threshold: usize,
    /// Minimum content size in a region for it to be worth one summary.
    pub minimum_content_size_per_summary: usize,
    /// Quick-response window: how long the tools stage waits for scheduled
    /// calls before falling back to webhook wake-ups.
    pub quick_response_time: Duration,
    /// Activity used when none is set on the state.
    pub default_activity: String,
}

impl Default for Knobs {
    fn default() -> Self {
        Self {
            summarize_size_threshold: 4000,
            summarize_days_ago_threshold: 2,
            max_conversation_size: 50_000,
            channel_size_threshold: 20_000,
            minimum_content_size_per_summary: 300,
            quick_response_time: Duration::from_secs(2),
            default_activity: "conversing".to_string(),
        }
    }
}

impl Knobs {
    /// Builds knobs from the environment, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            summarize_size_threshold: env_parse(
                "SUMMARIZE_SIZE_THRESHOLD",
                defaults.summarize_size_threshold,
            ),
            summarize_days_ago_threshold: env_parse(
                "SUMMARIZE_DAYS_AGO_THRESHOLD",
                defaults.summarize_days_ago_threshold,
            ),
            max_conversation_size: env_parse(
                "MAX_CONVERSATION_SIZE",
                defaults.max_conversation_size,
            ),
            channel_size_threshold: env_parse(
                "CHANNEL_SIZE_THRESHOLD",
                defaults.channel_size_threshold,
            ),
            minimum_content_size_per_summary: env_parse(
                "MINIMUM_CONTENT_SIZE_PER_SUMMARY",
                defaults.minimum_content_size_per_summary,
            ),
            quick_response_time: Duration::from_secs_f64(env_parse(
                "QUICK_RESPONSE_TIME",
                defaults.quick_response_time.as_secs_f64(),
            )),
            default_activity: std::env::var("DEFAULT_ACTIVITY")
                .unwrap_or(defaults.default_activity),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
