//! Answer generator trait and model configuration.
//!
//! The LLM service is an external collaborator: implementations live in the
//! app crate (`medibot::generator`) and tests supply their own fakes.
//! Generation is a single attempt; the caller never retries.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Usage;
use crate::secret::Credential;

/// Default backing model.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";

/// Default sampling temperature, kept low to favour factual answers.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Model selection and sampling parameters for one generator.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    /// In `[0.0, 1.0]`.
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// `None` when the configured environment variable was not set.
    pub credential: Option<Credential>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            credential: None,
        }
    }
}

/// A complete generated answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Credential missing, rejected (401), or not permitted (403).
    Auth,
    /// Quota or rate limit (429).
    RateLimited,
    /// Connection, TLS, or I/O failure before a response arrived.
    Transport,
    /// A response arrived but could not be understood.
    Malformed,
    /// Any other non-success response.
    Service,
}

impl GenerationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationErrorKind::Auth => "authentication",
            GenerationErrorKind::RateLimited => "rate limit",
            GenerationErrorKind::Transport => "transport",
            GenerationErrorKind::Malformed => "malformed response",
            GenerationErrorKind::Service => "service",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} error: {message}", .kind.as_str())]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// An LLM service that turns a prompt into an answer.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Identifier of the backing model, for logs.
    fn model_name(&self) -> &str;

    /// Generate a complete answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError>;
}
