//! OpenAI-compatible chat-completions answer generator.
//!
//! Works with any endpoint that speaks the OpenAI chat API; the default
//! configuration targets Groq. The prompt is sent as a single user message
//! and the first choice's content is the answer.
//!
//! One request per question. Errors are classified, never retried:
//!
//! | Condition | [`GenerationErrorKind`] |
//! |-----------|-------------------------|
//! | credential unset, HTTP 401 / 403 | `Auth` |
//! | HTTP 429 | `RateLimited` |
//! | connect / TLS / body read failure | `Transport` |
//! | unparseable JSON, no choices, empty content | `Malformed` |
//! | any other non-2xx | `Service` |
//!
//! Response bodies quoted in error messages are passed through
//! [`Credential::redact`] first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use medibot_core::generate::{
    AnswerGenerator, Generation, GenerationError, GenerationErrorKind, ModelConfig,
};
use medibot_core::models::Usage;
use medibot_core::secret::Credential;

use crate::config::GenerationConfig;

/// Longest slice of an error body quoted back to the user.
const MAX_ERROR_BODY: usize = 300;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

pub struct ChatCompletionsGenerator {
    endpoint: String,
    model: ModelConfig,
    api_key_env: String,
    client: reqwest::Client,
}

impl ChatCompletionsGenerator {
    /// Build a generator from configuration, resolving the credential from
    /// the environment now.
    pub fn from_config(config: &GenerationConfig) -> anyhow::Result<Self> {
        Self::new(
            &config.base_url,
            config.model_config(),
            &config.api_key_env,
            std::time::Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn new(
        base_url: &str,
        model: ModelConfig,
        api_key_env: &str,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            api_key_env: api_key_env.to_string(),
            client,
        })
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.model.credential.as_ref()
    }

    /// Scrub the credential, then cut to [`MAX_ERROR_BODY`] characters.
    fn redact(&self, text: &str) -> String {
        let text = match self.credential() {
            Some(c) => c.redact(text),
            None => text.to_string(),
        };
        text.chars().take(MAX_ERROR_BODY).collect()
    }
}

fn classify_status(status: reqwest::StatusCode) -> GenerationErrorKind {
    match status.as_u16() {
        401 | 403 => GenerationErrorKind::Auth,
        429 => GenerationErrorKind::RateLimited,
        _ => GenerationErrorKind::Service,
    }
}

fn parse_chat_response(body: &str) -> Result<Generation, GenerationError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        GenerationError::new(GenerationErrorKind::Malformed, format!("invalid JSON: {}", e))
    })?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            GenerationError::new(GenerationErrorKind::Malformed, "response contained no answer")
        })?;

    let usage = parsed.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(Generation { text, usage })
}

#[async_trait]
impl AnswerGenerator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model.model
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let credential = self.credential().ok_or_else(|| {
            GenerationError::new(
                GenerationErrorKind::Auth,
                format!("{} environment variable not set", self.api_key_env),
            )
        })?;

        let request = ChatRequest {
            model: &self.model.model,
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(
            model = %self.model.model,
            prompt_chars = prompt.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                GenerationError::new(
                    GenerationErrorKind::Transport,
                    self.redact(&format!("request to {} failed: {}", self.endpoint, e)),
                )
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GenerationError::new(
                GenerationErrorKind::Transport,
                self.redact(&format!("reading response failed: {}", e)),
            )
        })?;

        if !status.is_success() {
            let kind = classify_status(status);
            warn!(%status, kind = kind.as_str(), "chat completion request rejected");
            return Err(GenerationError::new(
                kind,
                format!("HTTP {}: {}", status, self.redact(&body)),
            ));
        }

        let generation = parse_chat_response(&body)?;
        if let Some(usage) = &generation.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion finished"
            );
        }
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_success_with_usage() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Thirst.  "}}],
                      "usage":{"prompt_tokens":10,"completion_tokens":2,"total_tokens":12}}"#;
        let g = parse_chat_response(body).unwrap();
        assert_eq!(g.text, "  Thirst.  ");
        assert_eq!(g.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn test_parse_no_choices() {
        let err = parse_chat_response(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Malformed);
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_chat_response("<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Malformed);
    }

    #[test]
    fn test_classify_status() {
        use reqwest::StatusCode;
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), GenerationErrorKind::Auth);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), GenerationErrorKind::Auth);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            GenerationErrorKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            GenerationErrorKind::Service
        );
    }

    #[test]
    fn test_request_serialization() {
        let req = ChatRequest {
            model: "m",
            temperature: 0.1,
            max_tokens: None,
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "m");
        assert!(v.get("max_tokens").is_none());
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth_error() {
        let g = ChatCompletionsGenerator::new(
            "http://127.0.0.1:9",
            ModelConfig::default(),
            "MEDIBOT_UNSET_KEY",
            Duration::from_secs(1),
        )
        .unwrap();
        let err = g.generate("prompt").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Auth);
        assert!(err.message.contains("MEDIBOT_UNSET_KEY"));
    }

    #[test]
    fn test_redact_key_across_truncation_boundary() {
        let key = "gsk_ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let g = ChatCompletionsGenerator::new(
            "http://127.0.0.1:9",
            ModelConfig {
                credential: Some(Credential::new(key)),
                ..ModelConfig::default()
            },
            "GROQ_API_KEY",
            Duration::from_secs(1),
        )
        .unwrap();

        let body = format!("{}invalid api key: {}", "x".repeat(270), key);
        let text = g.redact(&body);
        assert!(!text.contains("gsk_ABCD"));
        assert!(text.chars().count() <= MAX_ERROR_BODY);
        assert!(text.ends_with("[REDACTED]"));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let g = ChatCompletionsGenerator::new(
            "https://api.groq.com/openai/v1/",
            ModelConfig::default(),
            "GROQ_API_KEY",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(g.endpoint, "https://api.groq.com/openai/v1/chat/completions");
    }
}
