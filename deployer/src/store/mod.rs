//! Persisted document store.
//!
//! Deployment and monitor records are kept as JSON documents keyed by
//! deployment id. Every write touches exactly one document and is applied
//! atomically; there are no multi-document transactions.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::DeployError;

/// A stored document: a JSON object of named fields
pub type Document = Map<String, Value>;

/// Sort direction for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters, a single ordering key and a limit
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep documents whose `field` equals `value`
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document passes every filter
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }

    /// Apply filters, ordering and limit to a set of documents
    pub fn apply(&self, docs: impl IntoIterator<Item = (String, Document)>) -> Vec<(String, Document)> {
        let mut results: Vec<_> = docs.into_iter().filter(|(_, doc)| self.matches(doc)).collect();

        if let Some((field, direction)) = &self.order_by {
            results.sort_by(|(_, a), (_, b)| {
                let ordering = compare_values(a.get(field), b.get(field));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}

/// Order two optional field values. Missing fields sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => compare_strings(a, b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

/// Timestamps compare by instant, since their fraction width varies
fn compare_strings(a: &str, b: &str) -> Ordering {
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Generic keyed document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or replace a document
    async fn set(&self, collection: &str, id: &str, fields: Document) -> Result<(), DeployError>;

    /// Merge top-level fields into an existing document.
    ///
    /// Returns `NotFound` if the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<(), DeployError>;

    /// Get a document by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, DeployError>;

    /// List `(id, document)` pairs matching the query
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Document)>, DeployError>;
}

/// Serialize a value into a document
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, DeployError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(DeployError::Persistence(format!(
            "Expected a JSON object, got {}",
            other
        ))),
    }
}

/// Deserialize a document into a typed record
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, DeployError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Build a document from a `serde_json::json!` object literal
pub fn fields(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
