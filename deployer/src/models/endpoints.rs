//! Endpoint set models

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical service entry point exposed by a deployed container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKey {
    BaseUrl,
    Ui,
    Docs,
    Completions,
    Chat,
    Embeddings,
    Tokenization,
}

impl EndpointKey {
    /// Every key, in canonical order
    pub const ALL: [EndpointKey; 7] = [
        EndpointKey::BaseUrl,
        EndpointKey::Ui,
        EndpointKey::Docs,
        EndpointKey::Completions,
        EndpointKey::Chat,
        EndpointKey::Embeddings,
        EndpointKey::Tokenization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKey::BaseUrl => "base_url",
            EndpointKey::Ui => "ui",
            EndpointKey::Docs => "docs",
            EndpointKey::Completions => "completions",
            EndpointKey::Chat => "chat",
            EndpointKey::Embeddings => "embeddings",
            EndpointKey::Tokenization => "tokenization",
        }
    }

    /// URL path the serving engine uses for this entry point
    pub fn path(&self) -> &'static str {
        match self {
            EndpointKey::BaseUrl | EndpointKey::Ui => "/",
            EndpointKey::Docs => "/redoc",
            EndpointKey::Completions => "/v1/completions",
            EndpointKey::Chat => "/v1/chat/completions",
            EndpointKey::Embeddings => "/v1/embeddings",
            EndpointKey::Tokenization => "/v1/tokenize",
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping of the seven logical entry points to URLs.
///
/// Slots may be missing while startup detection is still in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointSet(BTreeMap<EndpointKey, String>);

impl EndpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the canonical set served on `localhost:<port>`
    pub fn synthesize(port: u16) -> Self {
        let mut set = Self::new();
        for key in EndpointKey::ALL {
            set.insert(key, format!("http://localhost:{}{}", port, key.path()));
        }
        set
    }

    pub fn get(&self, key: EndpointKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: EndpointKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn insert(&mut self, key: EndpointKey, url: impl Into<String>) {
        self.0.insert(key, url.into());
    }

    /// Insert only if the slot is still empty. Returns true if inserted.
    pub fn fill(&mut self, key: EndpointKey, url: impl Into<String>) -> bool {
        if self.contains(key) {
            return false;
        }
        self.insert(key, url);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All seven slots are filled
    pub fn is_complete(&self) -> bool {
        EndpointKey::ALL.iter().all(|key| self.contains(*key))
    }

    /// Keys that still have no URL
    pub fn missing(&self) -> Vec<EndpointKey> {
        EndpointKey::ALL
            .into_iter()
            .filter(|key| !self.contains(*key))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EndpointKey, &str)> {
        self.0.iter().map(|(key, url)| (*key, url.as_str()))
    }
}

impl FromIterator<(EndpointKey, String)> for EndpointSet {
    fn from_iter<I: IntoIterator<Item = (EndpointKey, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
