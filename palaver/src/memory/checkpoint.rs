//! Checkpoint payload and metadata types.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Where a checkpoint came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// Written from a run input before any stage ran.
    #[default]
    Input,
    /// Written at a stage boundary inside a run.
    Step,
    /// Written at the end of a run.
    Update,
}

/// Metadata stored next to each checkpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,
    /// Stage-boundary counter within the run (-1 for input).
    pub step: i64,
}

/// One persisted state snapshot for a thread.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint<S> {
    pub id: String,
    /// RFC 3339 creation instant.
    pub ts: String,
    pub state: S,
    pub metadata: CheckpointMetadata,
}

impl<S> Checkpoint<S> {
    pub fn from_state(state: S, source: CheckpointSource, step: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ts: Utc::now().to_rfc3339(),
            state,
            metadata: CheckpointMetadata { source, step },
        }
    }
}

/// Listing entry for checkpoint history.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointListItem {
    pub checkpoint_id: String,
    pub metadata: CheckpointMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: from_state stamps a fresh uuid and rfc3339 timestamp.
    #[test]
    fn from_state_stamps_id_and_ts() {
        let cp = Checkpoint::from_state(41, CheckpointSource::Step, 2);
        assert_eq!(cp.state, 41);
        assert_eq!(cp.metadata.step, 2);
        assert_eq!(cp.metadata.source, CheckpointSource::Step);
        assert_eq!(cp.id.len(), 36, "uuid4 with hyphens");
        assert!(chrono::DateTime::parse_from_rfc3339(&cp.ts).is_ok());

        let other = Checkpoint::from_state(41, CheckpointSource::Step, 2);
        assert_ne!(cp.id, other.id);
    }
}
