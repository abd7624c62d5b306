//! JSON-file backed document store.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::filesys::file::File;

use super::memory::{Collections, MemoryStore};
use super::{Document, DocumentStore, Query};

/// Document store that keeps every collection in memory and writes a full
/// snapshot to disk after each mutation.
pub struct FileStore {
    inner: MemoryStore,
    file: File,
    flush_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store, loading an existing snapshot if there is one
    pub async fn open(file: File) -> Result<Self, DeployError> {
        let collections: Collections = if file.exists().await {
            file.read_json().await.map_err(|e| {
                DeployError::ConfigError(format!(
                    "Unable to load store snapshot {}: {}",
                    file.path().display(),
                    e
                ))
            })?
        } else {
            Collections::new()
        };

        info!(
            "Opened document store at {} ({} collections)",
            file.path().display(),
            collections.len()
        );

        Ok(Self {
            inner: MemoryStore::from_collections(collections),
            file,
            flush_lock: Mutex::new(()),
        })
    }

    async fn flush(&self) -> Result<(), DeployError> {
        // Snapshots are taken and written under one lock so an older
        // snapshot can never overwrite a newer one.
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.inner.snapshot()?;
        self.file
            .write_json_atomic(&snapshot)
            .await
            .map_err(|e| DeployError::Persistence(e.to_string()))?;
        debug!("Flushed store snapshot to {}", self.file.path().display());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn set(&self, collection: &str, id: &str, fields: Document) -> Result<(), DeployError> {
        self.inner.set(collection, id, fields).await?;
        self.flush().await
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), DeployError> {
        self.inner.update(collection, id, fields).await?;
        self.flush().await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, DeployError> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Document)>, DeployError> {
        self.inner.query(collection, query).await
    }
}
