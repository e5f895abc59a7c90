#![allow(dead_code)]

use async_trait::async_trait;
use findocs_rag::chunking::ChunkConfig;
use findocs_rag::config::RagConfig;
use findocs_rag::embeddings::{Embedder, Embedding};
use findocs_rag::generation::Generator;
use findocs_rag::rag::RagEngine;
use findocs_rag::retry::RetryPolicy;
use findocs_rag::store::VectorStore;
use findocs_rag::ServiceError;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIMENSIONS: u64 = 256;

/// Bag-of-words embedder: each lowercase word adds 1.0 to a hashed dimension
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut values = vec![0.0; DIMENSIONS as usize];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            values[(hasher.finish() % DIMENSIONS) as usize] += 1.0;
        }
        values
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> u64 {
        DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Embedding, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Embedding::new(Self::vector(text)))
    }
}

/// Embedder whose every call fails with the given error
pub struct FailingEmbedder {
    pub status: u16,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimensions(&self) -> u64 {
        DIMENSIONS
    }

    async fn embed(&self, _text: &str) -> Result<Embedding, ServiceError> {
        Err(ServiceError::Status {
            status: self.status,
            body: "embedding service unavailable".to_string(),
        })
    }
}

/// Generator that records prompts and replays scripted responses,
/// answering "Revenue grew by 10%." once the script runs out
#[derive(Default)]
pub struct ScriptedGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub script: Mutex<VecDeque<Result<String, ServiceError>>>,
}

impl ScriptedGenerator {
    pub fn with_script(script: Vec<Result<String, ServiceError>>) -> Self {
        ScriptedGenerator {
            prompts: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Revenue grew by 10%.".to_string()))
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        multiplier: 2,
        timeout: Duration::from_secs(5),
    }
}

pub fn small_chunks_config() -> RagConfig {
    RagConfig {
        chunking: ChunkConfig::new(50, 10).unwrap(),
        ..Default::default()
    }
}

pub fn engine(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> RagEngine {
    RagEngine::new(store, embedder, generator, small_chunks_config(), fast_retry())
}
