//! HTTP wrapper exposing the question-answering pipeline.

use crate::error::RagError;
use crate::rag::{Answer, RagEngine};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourceResponse {
    pub text: String,
    pub score: f32,
    pub source_id: String,
    pub page_number: usize,
    pub start_offset: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceResponse>,
}

impl From<Answer> for QuestionResponse {
    fn from(answer: Answer) -> Self {
        QuestionResponse {
            question: answer.question,
            answer: answer.text,
            sources: answer
                .sources
                .into_iter()
                .map(|scored| SourceResponse {
                    text: scored.chunk.text,
                    score: scored.score,
                    source_id: scored.chunk.source_id,
                    page_number: scored.chunk.page_number,
                    start_offset: scored.chunk.start_offset,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    collection: String,
}

/// Error returned by handlers; maps the pipeline taxonomy to HTTP statuses
pub struct ApiError(RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(RagError::InvalidQuestion(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RagError::InvalidQuestion(_) => StatusCode::BAD_REQUEST,
            RagError::CollectionNotFound(_) => StatusCode::NOT_FOUND,
            RagError::Embedding(e) | RagError::Generation(e) if e.is_timeout() => {
                StatusCode::GATEWAY_TIMEOUT
            }
            RagError::Embedding(_) | RagError::Generation(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the application router
pub fn build_router(engine: Arc<RagEngine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rag", post(rag_query))
        .with_state(engine)
}

/// Serve the router on `bind_addr` until the process is stopped
pub async fn serve(engine: Arc<RagEngine>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(engine)).await?;
    Ok(())
}

async fn health(State(engine): State<Arc<RagEngine>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        collection: engine.config().collection.clone(),
    })
}

async fn rag_query(
    State(engine): State<Arc<RagEngine>>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let Json(request) = payload?;
    let answer = engine.ask(&request.question).await?;
    Ok(Json(answer.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use std::time::Duration;

    #[test]
    fn test_error_statuses() {
        let cases = [
            (RagError::InvalidQuestion("empty".to_string()), StatusCode::BAD_REQUEST),
            (RagError::CollectionNotFound("fin-docs".to_string()), StatusCode::NOT_FOUND),
            (
                RagError::Generation(ServiceError::Timeout(Duration::from_secs(60))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                RagError::Embedding(ServiceError::Status {
                    status: 429,
                    body: String::new(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (RagError::Store("down".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
