use crate::error::ServiceError;
use async_trait::async_trait;

/// Produces a natural-language answer for a fully assembled prompt
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}
