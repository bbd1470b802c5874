mod common;

use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::time::Duration;

use common::spawn_mock;
use medibot::generator::ChatCompletionsGenerator;
use medibot_core::generate::{AnswerGenerator, GenerationErrorKind, ModelConfig};
use medibot_core::secret::Credential;

const KEY: &str = "gsk_integration_secret";

/// Routes on the prompt text so one mock covers every outcome.
async fn chat_completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();

    if body["messages"][0]["role"] != "user" || body["model"].as_str().is_none() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request shape"})));
    }

    match prompt {
        "unauthorized" => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": format!("Invalid API Key: {}", auth)}})),
        ),
        "rate" => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"message": "Rate limit reached"}})),
        ),
        "boom" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "internal"}})),
        ),
        "empty" => (StatusCode::OK, Json(json!({"choices": []}))),
        _ => (
            StatusCode::OK,
            Json(json!({
                "choices": [{"message": {"role": "assistant", "content": format!("echo: {}", prompt)}}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8},
                "temperature_seen": body["temperature"],
            })),
        ),
    }
}

async fn generator() -> ChatCompletionsGenerator {
    let base = spawn_mock(Router::new().route("/chat/completions", post(chat_completions))).await;
    let model = ModelConfig {
        credential: Some(Credential::new(KEY)),
        ..ModelConfig::default()
    };
    ChatCompletionsGenerator::new(&base, model, "GROQ_API_KEY", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_successful_completion() {
    let g = generator().await;
    let out = g.generate("What is asthma?").await.unwrap();
    assert_eq!(out.text, "echo: What is asthma?");
    assert_eq!(out.usage.unwrap().total_tokens, 8);
}

#[tokio::test]
async fn test_unauthorized_is_auth_and_redacted() {
    let g = generator().await;
    let err = g.generate("unauthorized").await.unwrap_err();
    assert_eq!(err.kind, GenerationErrorKind::Auth);
    assert!(err.message.contains("401"));
    assert!(!err.message.contains(KEY));
    assert!(!err.to_string().contains(KEY));
}

#[tokio::test]
async fn test_rate_limited() {
    let g = generator().await;
    let err = g.generate("rate").await.unwrap_err();
    assert_eq!(err.kind, GenerationErrorKind::RateLimited);
}

#[tokio::test]
async fn test_server_error_is_service() {
    let g = generator().await;
    let err = g.generate("boom").await.unwrap_err();
    assert_eq!(err.kind, GenerationErrorKind::Service);
}

#[tokio::test]
async fn test_no_choices_is_malformed() {
    let g = generator().await;
    let err = g.generate("empty").await.unwrap_err();
    assert_eq!(err.kind, GenerationErrorKind::Malformed);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let model = ModelConfig {
        credential: Some(Credential::new(KEY)),
        ..ModelConfig::default()
    };
    let g = ChatCompletionsGenerator::new(
        &format!("http://{}", addr),
        model,
        "GROQ_API_KEY",
        Duration::from_secs(2),
    )
    .unwrap();
    let err = g.generate("hello").await.unwrap_err();
    assert_eq!(err.kind, GenerationErrorKind::Transport);
    assert!(!err.message.contains(KEY));
}
