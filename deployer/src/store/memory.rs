//! In-memory document store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::DeployError;

use super::{Document, DocumentStore, Query};

/// Collection name -> document id -> document
pub(super) type Collections = HashMap<String, HashMap<String, Document>>;

/// In-memory document store.
///
/// Data is lost when the process exits. Used by default and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn from_collections(collections: Collections) -> Self {
        Self {
            collections: RwLock::new(collections),
        }
    }

    /// Copy of every collection
    pub(super) fn snapshot(&self) -> Result<Collections, DeployError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| DeployError::Persistence("lock poisoned".to_string()))?;
        Ok(collections.clone())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn set(&self, collection: &str, id: &str, fields: Document) -> Result<(), DeployError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DeployError::Persistence("lock poisoned".to_string()))?;

        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), DeployError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DeployError::Persistence("lock poisoned".to_string()))?;

        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| DeployError::NotFound(format!("{}/{}", collection, id)))?;

        for (key, value) in fields {
            doc.insert(key, value);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, DeployError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| DeployError::Persistence("lock poisoned".to_string()))?;

        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Document)>, DeployError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| DeployError::Persistence("lock poisoned".to_string()))?;

        let docs = match collections.get(collection) {
            Some(docs) => docs
                .iter()
                .map(|(id, doc)| (id.clone(), doc.clone()))
                .collect::<Vec<_>>(),
            None => return Ok(Vec::new()),
        };
        Ok(query.apply(docs))
    }
}
