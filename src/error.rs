use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = RagError> = std::result::Result<T, E>;

/// Errors surfaced by the ingestion and question-answering pipeline
#[derive(Debug, Error)]
pub enum RagError {
    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error(
        "collection {name} already exists with dimension {existing_dim} ({existing_metric}), \
         requested {requested_dim} ({requested_metric})"
    )]
    CollectionConflict {
        name: String,
        existing_dim: u64,
        existing_metric: String,
        requested_dim: u64,
        requested_metric: String,
    },

    #[error("collection {0} not found")]
    CollectionNotFound(String),

    #[error("embedding request failed: {0}")]
    Embedding(#[source] ServiceError),

    #[error("generation request failed: {0}")]
    Generation(#[source] ServiceError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid question: {0}")]
    InvalidQuestion(String),

    #[error("vector store error: {0}")]
    Store(String),
}

impl RagError {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RagError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        RagError::Config(message.into())
    }

    /// Short machine-readable name, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Load { .. } => "load_error",
            RagError::CollectionConflict { .. } => "collection_conflict",
            RagError::CollectionNotFound(_) => "collection_not_found",
            RagError::Embedding(_) => "embedding_error",
            RagError::Generation(_) => "generation_error",
            RagError::Config(_) => "config_error",
            RagError::InvalidQuestion(_) => "invalid_question",
            RagError::Store(_) => "store_error",
        }
    }
}

/// Failure of a call to a hosted model API
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("API request failed: {status} {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Whether the same request may succeed if sent again
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Timeout(_) | ServiceError::Transport(_) => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::InvalidResponse(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}
