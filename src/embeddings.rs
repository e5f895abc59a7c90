use crate::error::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Embedding { values }
    }

    pub fn dimensions(&self) -> usize {
        self.values.len()
    }
}

/// Maps text to fixed-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces
    fn dimensions(&self) -> u64;

    /// Generate the embedding for one text
    async fn embed(&self, text: &str) -> Result<Embedding, ServiceError>;

    /// Generate embeddings for several texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ServiceError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}
