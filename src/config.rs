use crate::chunking::ChunkConfig;
use crate::error::{RagError, Result};
use crate::openai::OpenAiConfig;
use crate::prompt::PromptTemplate;
use crate::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which vector store backend to use
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    Qdrant { url: String, api_key: Option<String> },
    Memory { path: Option<PathBuf> },
}

/// Settings for the ingestion and query pipeline
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub collection: String,
    pub top_k: u64,
    pub context_separator: String,
    pub template: PromptTemplate,
    pub chunking: ChunkConfig,
    pub load_concurrency: usize,
    pub embed_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        RagConfig {
            collection: "fin-docs".to_string(),
            top_k: 5,
            context_separator: "\n\n".to_string(),
            template: PromptTemplate::default(),
            chunking: ChunkConfig::default(),
            load_concurrency: 4,
            embed_batch_size: 64,
        }
    }
}

/// Complete application configuration, built once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub store: StoreConfig,
    pub rag: RagConfig,
    pub retry: RetryPolicy,
    pub bind_addr: String,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| RagError::config("OPENAI_API_KEY is not set"))?;

        let openai = OpenAiConfig {
            api_key,
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimensions: parse_or(&get, "EMBEDDING_DIMENSIONS", 1536)?,
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature: parse_or(&get, "CHAT_TEMPERATURE", 0.0)?,
        };

        let store = match get("VECTOR_STORE").as_deref().unwrap_or("qdrant") {
            "qdrant" => StoreConfig::Qdrant {
                url: get("QDRANT_URL").unwrap_or_else(|| "http://localhost:6334".to_string()),
                api_key: get("QDRANT_API_KEY"),
            },
            "memory" => StoreConfig::Memory {
                path: get("VECTOR_STORE_PATH").map(PathBuf::from),
            },
            other => {
                return Err(RagError::config(format!(
                    "VECTOR_STORE must be 'qdrant' or 'memory', got '{}'",
                    other
                )))
            }
        };

        let chunking = ChunkConfig::new(
            parse_or(&get, "CHUNK_MAX_CHARS", 1000)?,
            parse_or(&get, "CHUNK_OVERLAP_CHARS", 200)?,
        )?;

        let template = match get("PROMPT_TEMPLATE") {
            Some(text) => PromptTemplate::new(&text)?,
            None => PromptTemplate::default(),
        };

        let top_k: u64 = parse_or(&get, "TOP_K", 5)?;
        if top_k == 0 {
            return Err(RagError::config("TOP_K must be at least 1"));
        }

        let rag = RagConfig {
            collection: get("COLLECTION_NAME").unwrap_or_else(|| "fin-docs".to_string()),
            top_k,
            template,
            chunking,
            load_concurrency: parse_or::<usize, _>(&get, "LOAD_CONCURRENCY", 4)?.max(1),
            embed_batch_size: parse_or::<usize, _>(&get, "EMBED_BATCH_SIZE", 64)?.max(1),
            ..Default::default()
        };

        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "RETRY_MAX_ATTEMPTS", 3)?,
            initial_backoff: Duration::from_millis(parse_or(&get, "RETRY_INITIAL_BACKOFF_MS", 500)?),
            max_backoff: Duration::from_millis(parse_or(&get, "RETRY_MAX_BACKOFF_MS", 8000)?),
            timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 60)?),
            ..Default::default()
        };

        Ok(Config {
            openai,
            store,
            rag,
            retry,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8000".to_string()),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RagError::config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
