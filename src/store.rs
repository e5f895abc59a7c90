use crate::chunking::TextChunk;
use crate::embeddings::Embedding;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Similarity metric of a collection, fixed for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Cosine similarity, higher is closer
    Cosine,
    /// Dot product, higher is closer
    Dot,
    /// Euclidean distance, lower is closer
    Euclid,
}

impl Metric {
    /// Whether larger scores mean closer vectors
    pub fn higher_is_closer(self) -> bool {
        !matches!(self, Metric::Euclid)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cosine => "cosine",
            Metric::Dot => "dot",
            Metric::Euclid => "euclid",
        };
        f.write_str(name)
    }
}

/// A chunk and its vector, ready to be written to a collection
#[derive(Debug, Clone)]
pub struct StoredPoint {
    /// Reused when set, otherwise the store assigns a new id
    pub id: Option<String>,
    pub embedding: Embedding,
    pub chunk: TextChunk,
}

impl StoredPoint {
    pub fn new(chunk: TextChunk, embedding: Embedding) -> Self {
        StoredPoint {
            id: None,
            embedding,
            chunk,
        }
    }
}

/// One retrieved chunk with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub chunk: TextChunk,
    pub score: f32,
}

/// Retrieved chunks, closest first
pub type QueryResult = Vec<ScoredChunk>;

/// Persists embedded chunks in named collections and answers k-NN queries
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent; an existing one must match `dim` and `metric`
    async fn ensure_collection(&self, name: &str, dim: u64, metric: Metric) -> Result<()>;

    /// Check if a collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Delete a collection; deleting a missing collection is not an error
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or overwrite points, returning their ids in input order
    async fn upsert(&self, name: &str, points: Vec<StoredPoint>) -> Result<Vec<String>>;

    /// Return up to `k` nearest chunks to `embedding`, closest first
    async fn query(&self, name: &str, embedding: &Embedding, k: u64) -> Result<QueryResult>;
}
