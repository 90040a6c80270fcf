//! JSON file store with per-path async locks.
//!
//! One writer at a time per path; writes go to a temp file and rename into
//! place so readers never observe a torn document.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

static FILE_LOCKS: Lazy<DashMap<PathBuf, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Typed JSON document on disk. Missing files read as `T::default()`.
pub struct JsonDb<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDb<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Arc<Mutex<()>> {
        FILE_LOCKS
            .entry(self.path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_unlocked(&self) -> Result<T, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the current document (default when the file does not exist).
    pub async fn read(&self) -> Result<T, StoreError> {
        let lock = self.lock();
        let _guard = lock.lock().await;
        self.read_unlocked().await
    }

    /// Read-modify-write under the path lock; returns the stored document.
    pub async fn update<F>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let lock = self.lock();
        let _guard = lock.lock().await;
        let mut value = self.read_unlocked().await?;
        mutate(&mut value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let payload = serde_json::to_vec_pretty(&value)?;
        let temp = self.path.with_extension("tmp");
        tokio::fs::write(&temp, payload).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(value)
    }
}
