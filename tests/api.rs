mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{engine, HashEmbedder, ScriptedGenerator};
use findocs_rag::document::Page;
use findocs_rag::memory::MemoryStore;
use findocs_rag::server::{build_router, ErrorResponse, QuestionResponse};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

fn rag_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/rag")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn rag_endpoint_returns_answer_with_sources() {
    let engine = engine(
        Arc::new(MemoryStore::new()),
        Arc::new(HashEmbedder::default()),
        Arc::new(ScriptedGenerator::default()),
    );
    engine
        .ingest_pages(&[Page::new(
            "q1-report.pdf",
            1,
            "Revenue increased by 10% in Q1. Net income rose by 5%.",
        )])
        .await
        .unwrap();
    let app = build_router(Arc::new(engine));

    let response = app
        .oneshot(rag_request(r#"{"question": "How did revenue change in Q1?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: QuestionResponse = read_json(response).await;
    assert_eq!(body.question, "How did revenue change in Q1?");
    assert_eq!(body.answer, "Revenue grew by 10%.");
    assert!(!body.sources.is_empty());
    assert!(body
        .sources
        .iter()
        .all(|source| source.source_id == "q1-report.pdf" && source.page_number == 1));
}

#[tokio::test]
async fn blank_question_is_bad_request() {
    let app = build_router(Arc::new(engine(
        Arc::new(MemoryStore::new()),
        Arc::new(HashEmbedder::default()),
        Arc::new(ScriptedGenerator::default()),
    )));

    let response = app.oneshot(rag_request(r#"{"question": "  "}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.kind, "invalid_question");
}

#[tokio::test]
async fn malformed_body_is_json_bad_request() {
    let generator = Arc::new(ScriptedGenerator::default());
    let app = build_router(Arc::new(engine(
        Arc::new(MemoryStore::new()),
        Arc::new(HashEmbedder::default()),
        generator.clone(),
    )));

    for body in [r#"{"q": 1}"#, "not json", r#"{"question": 42}"#] {
        let response = app.clone().oneshot(rag_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {:?}", body);
        let error: ErrorResponse = read_json(response).await;
        assert_eq!(error.kind, "invalid_question");
        assert!(!error.error.is_empty());
    }
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn missing_content_type_is_json_bad_request() {
    let app = build_router(Arc::new(engine(
        Arc::new(MemoryStore::new()),
        Arc::new(HashEmbedder::default()),
        Arc::new(ScriptedGenerator::default()),
    )));

    let request = Request::builder()
        .method("POST")
        .uri("/rag")
        .body(Body::from(r#"{"question": "What was Q1 revenue?"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.kind, "invalid_question");
}

#[tokio::test]
async fn missing_collection_is_not_found() {
    let generator = Arc::new(ScriptedGenerator::default());
    let app = build_router(Arc::new(engine(
        Arc::new(MemoryStore::new()),
        Arc::new(HashEmbedder::default()),
        generator.clone(),
    )));

    let response = app
        .oneshot(rag_request(r#"{"question": "What was Q1 revenue?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.kind, "collection_not_found");
    assert!(body.error.contains("fin-docs"));
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn health_reports_collection() {
    let app = build_router(Arc::new(engine(
        Arc::new(MemoryStore::new()),
        Arc::new(HashEmbedder::default()),
        Arc::new(ScriptedGenerator::default()),
    )));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["collection"], "fin-docs");
}
