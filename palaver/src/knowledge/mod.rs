//! Long-term memory spaces: a JSON document store and its digest.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::{JsonDb, StoreError};

/// One memory space: what may be stored there and how to filter it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub description: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub content: String,
}

/// The persisted database of memory spaces.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// File-backed store over [`Database`].
pub struct KnowledgeStore {
    db: JsonDb<Database>,
}

impl KnowledgeStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            db: JsonDb::new(path),
        }
    }

    pub async fn read(&self) -> Result<Database, StoreError> {
        self.db.read().await
    }

    pub async fn add(&self, document: Document) -> Result<(), StoreError> {
        self.db
            .update(|database| database.documents.push(document))
            .await?;
        Ok(())
    }

    pub async fn remove(&self, index: usize) -> Result<Option<Document>, StoreError> {
        let mut removed = None;
        self.db
            .update(|database| {
                if index < database.documents.len() {
                    removed = Some(database.documents.remove(index));
                }
            })
            .await?;
        Ok(removed)
    }

    /// A one-note digest of the stored spaces, or None when empty.
    pub async fn digest(&self) -> Result<Option<String>, StoreError> {
        let database = self.read().await?;
        if database.documents.is_empty() {
            return Ok(None);
        }
        let lines: Vec<String> = database
            .documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                format!(
                    "{index}. {} ({} chars stored)",
                    doc.description,
                    doc.content.len()
                )
            })
            .collect();
        Ok(Some(format!("Known memory spaces:\n{}", lines.join("\n"))))
    }
}
