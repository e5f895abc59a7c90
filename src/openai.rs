use crate::embeddings::{Embedder, Embedding};
use crate::error::ServiceError;
use crate::generation::Generator;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

/// Configuration for an OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub dimensions: u64,
    pub chat_model: String,
    pub temperature: f32,
}

/// Client for the embeddings and chat completion endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::new();
        OpenAiClient { config, client }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, ServiceError>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        Ok(response.json().await?)
    }

    /// Generate embeddings for a batch of texts, in input order
    pub async fn get_embeddings(&self, texts: &[String]) -> Result<Vec<Embedding>, ServiceError> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        let response: EmbeddingResponse = self.post("embeddings", &request).await?;
        debug!("Received {} embeddings", response.data.len());

        let embeddings = response.into_ordered(texts.len())?;
        if let Some(bad) = embeddings
            .iter()
            .find(|e| e.dimensions() as u64 != self.config.dimensions)
        {
            return Err(ServiceError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.config.dimensions,
                bad.dimensions()
            )));
        }

        Ok(embeddings)
    }

    /// Generate a chat completion for a single user prompt
    pub async fn generate_text(&self, prompt: &str) -> Result<String, ServiceError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?;

        // Extract the generated text from the response
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::InvalidResponse("No response generated".to_string()))
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    fn dimensions(&self) -> u64 {
        self.config.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Embedding, ServiceError> {
        let mut embeddings = self.get_embeddings(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| ServiceError::InvalidResponse("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.get_embeddings(texts).await
    }
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.generate_text(prompt).await
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    /// Order vectors by their `index` and check one came back per input
    fn into_ordered(mut self, expected: usize) -> Result<Vec<Embedding>, ServiceError> {
        if self.data.len() != expected {
            return Err(ServiceError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                self.data.len()
            )));
        }
        self.data.sort_by_key(|d| d.index);
        Ok(self
            .data
            .into_iter()
            .map(|d| Embedding::new(d.embedding))
            .collect())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new(OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: base_url.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            dimensions: 3,
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
        })
    }

    #[test]
    fn test_endpoint_joins_paths() {
        assert_eq!(
            client("https://api.openai.com/v1/").endpoint("embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[test]
    fn test_embeddings_are_ordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [
                {"index": 1, "embedding": [0.0, 1.0, 0.0]},
                {"index": 0, "embedding": [1.0, 0.0, 0.0]}
            ]}"#,
        )
        .unwrap();

        let embeddings = response.into_ordered(2).unwrap();
        assert_eq!(embeddings[0].values, vec![1.0, 0.0, 0.0]);
        assert_eq!(embeddings[1].values, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_embeddings_are_rejected() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#).unwrap();
        assert!(matches!(
            response.into_ordered(2),
            Err(ServiceError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "What was Q1 revenue?",
            }],
            temperature: 0.0,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "What was Q1 revenue?");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transient_error() {
        let err = client("http://127.0.0.1:9").embed("revenue").await.unwrap_err();
        assert!(err.is_transient());
    }
}
