//! SQLite-backed checkpointer. Persistent across process restarts.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;

use super::checkpoint::{Checkpoint, CheckpointListItem, CheckpointMetadata, CheckpointSource};
use super::checkpointer::{CheckpointError, Checkpointer};
use super::config::RunConfig;
use super::serializer::Serializer;

fn source_to_str(source: CheckpointSource) -> &'static str {
    match source {
        CheckpointSource::Input => "input",
        CheckpointSource::Step => "step",
        CheckpointSource::Update => "update",
    }
}

fn str_to_source(s: &str) -> CheckpointSource {
    match s {
        "input" => CheckpointSource::Input,
        "step" => CheckpointSource::Step,
        _ => CheckpointSource::Update,
    }
}

/// SQLite-backed checkpointer keyed by (thread_id, checkpoint_id).
///
/// Opens a connection per operation inside `spawn_blocking`; fine for a
/// single-node runtime where the checkpoint lock serializes writers anyway.
pub struct SqliteSaver<S> {
    db_path: std::path::PathBuf,
    serializer: Arc<dyn Serializer<S>>,
}

impl<S> SqliteSaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Creates the saver and ensures the table exists.
    pub fn new(
        path: impl AsRef<Path>,
        serializer: Arc<dyn Serializer<S>>,
    ) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT NOT NULL,
                checkpoint_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                payload BLOB NOT NULL,
                metadata_source TEXT NOT NULL,
                metadata_step INTEGER NOT NULL,
                PRIMARY KEY (thread_id, checkpoint_id)
            )
            "#,
            [],
        )
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(Self {
            db_path,
            serializer,
        })
    }

    fn thread_id_required(config: &RunConfig) -> Result<String, CheckpointError> {
        config
            .thread_id
            .clone()
            .ok_or(CheckpointError::ThreadIdRequired)
    }
}

#[async_trait]
impl<S> Checkpointer<S> for SqliteSaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn put(
        &self,
        config: &RunConfig,
        checkpoint: &Checkpoint<S>,
    ) -> Result<String, CheckpointError> {
        let thread_id = Self::thread_id_required(config)?;
        let payload = self.serializer.serialize(&checkpoint.state)?;
        let id = checkpoint.id.clone();
        let ts = checkpoint.ts.clone();
        let metadata_source = source_to_str(checkpoint.metadata.source).to_string();
        let metadata_step = checkpoint.metadata.step;

        let db_path = self.db_path.clone();
        let stored_id = id.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                r#"
                INSERT OR REPLACE INTO checkpoints
                (thread_id, checkpoint_id, ts, payload, metadata_source, metadata_step)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![thread_id, id, ts, payload, metadata_source, metadata_step],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok::<_, CheckpointError>(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))??;
        Ok(stored_id)
    }

    async fn get_tuple(
        &self,
        config: &RunConfig,
    ) -> Result<Option<(Checkpoint<S>, CheckpointMetadata)>, CheckpointError> {
        let thread_id = Self::thread_id_required(config)?;
        let checkpoint_id = config.checkpoint_id.clone();
        let db_path = self.db_path.clone();

        let row = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut query = match &checkpoint_id {
                Some(_) => conn.prepare(
                    "SELECT checkpoint_id, ts, payload, metadata_source, metadata_step
                     FROM checkpoints WHERE thread_id = ?1 AND checkpoint_id = ?2",
                ),
                None => conn.prepare(
                    "SELECT checkpoint_id, ts, payload, metadata_source, metadata_step
                     FROM checkpoints WHERE thread_id = ?1 ORDER BY rowid DESC LIMIT 1",
                ),
            }
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String, Vec<u8>, String, i64)> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            };
            let result = match &checkpoint_id {
                Some(id) => query.query_row(params![thread_id, id], map_row),
                None => query.query_row(params![thread_id], map_row),
            };
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(CheckpointError::Storage(e.to_string())),
            }
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))??;

        let Some((id, ts, payload, source, step)) = row else {
            return Ok(None);
        };
        let state = self.serializer.deserialize(&payload)?;
        let metadata = CheckpointMetadata {
            source: str_to_source(&source),
            step,
        };
        Ok(Some((
            Checkpoint {
                id,
                ts,
                state,
                metadata: metadata.clone(),
            },
            metadata,
        )))
    }

    async fn list(&self, config: &RunConfig) -> Result<Vec<CheckpointListItem>, CheckpointError> {
        let thread_id = Self::thread_id_required(config)?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut query = conn
                .prepare(
                    "SELECT checkpoint_id, metadata_source, metadata_step
                     FROM checkpoints WHERE thread_id = ?1 ORDER BY rowid ASC",
                )
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let rows = query
                .query_map(params![thread_id], |row| {
                    Ok(CheckpointListItem {
                        checkpoint_id: row.get(0)?,
                        metadata: CheckpointMetadata {
                            source: str_to_source(&row.get::<_, String>(1)?),
                            step: row.get(2)?,
                        },
                    })
                })
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CheckpointError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}
