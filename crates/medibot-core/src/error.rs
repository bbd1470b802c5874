//! Pipeline error taxonomy and user-facing notifications.
//!
//! | Variant | Scope | Effect |
//! |---------|-------|--------|
//! | [`IndexUnavailable`](PipelineError::IndexUnavailable) | startup | fatal, no answers possible |
//! | [`Retrieval`](PipelineError::Retrieval), [`RetrievalTimeout`](PipelineError::RetrievalTimeout) | request | session stays usable |
//! | [`Generation`](PipelineError::Generation), [`GenerationTimeout`](PipelineError::GenerationTimeout) | request | session stays usable |
//! | [`Cancelled`](PipelineError::Cancelled) | request | session stays usable |
//!
//! Every variant converts into a [`Notification`]: a one-line banner plus an
//! actionable hint.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::generate::{GenerationError, GenerationErrorKind};
use crate::secret::Credential;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("index unavailable at {path}: {reason}")]
    IndexUnavailable { path: String, reason: String },

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("retrieval timed out after {}s", .0.as_secs())]
    RetrievalTimeout(Duration),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("generation timed out after {}s", .0.as_secs())]
    GenerationTimeout(Duration),

    #[error("request cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn index_unavailable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::IndexUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable code used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::IndexUnavailable { .. } => "index_unavailable",
            PipelineError::Retrieval(_) => "retrieval_failed",
            PipelineError::RetrievalTimeout(_) => "retrieval_timeout",
            PipelineError::Generation(_) => "generation_failed",
            PipelineError::GenerationTimeout(_) => "generation_timeout",
            PipelineError::Cancelled => "cancelled",
        }
    }

    pub fn notification(&self) -> Notification {
        let (banner, hint) = match self {
            PipelineError::IndexUnavailable { .. } => (
                "❌ Error: the medical document index could not be loaded",
                "💡 Check that [index].path points to a pre-built index",
            ),
            PipelineError::Retrieval(_) => (
                "❌ Error: searching the medical database failed",
                "💡 Check the embedding provider settings, then ask again",
            ),
            PipelineError::RetrievalTimeout(_) => (
                "❌ Error: searching the medical database timed out",
                "💡 Try again, or raise retrieval.timeout_secs",
            ),
            PipelineError::Generation(e) if e.kind == GenerationErrorKind::RateLimited => (
                "❌ Error: the answer service rejected the request (rate limit or quota)",
                "💡 Check credential configuration and account quota, then try again later",
            ),
            PipelineError::Generation(_) => (
                "❌ Error: the answer service returned an error",
                "💡 Check credential configuration: make sure your API key is properly set in the .env file",
            ),
            PipelineError::GenerationTimeout(_) => (
                "❌ Error: the answer service timed out",
                "💡 Check credential configuration and network access, or raise generation.timeout_secs",
            ),
            PipelineError::Cancelled => (
                "❌ Request cancelled",
                "💡 Ask the question again when ready",
            ),
        };

        Notification {
            code: self.code().to_string(),
            banner: banner.to_string(),
            hint: hint.to_string(),
            detail: Some(self.to_string()),
        }
    }
}

/// A transient, user-visible error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub code: String,
    pub banner: String,
    pub hint: String,
    /// Underlying error text, for debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Notification {
    pub fn new(code: impl Into<String>, banner: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            banner: banner.into(),
            hint: hint.into(),
            detail: None,
        }
    }

    /// Scrub `credential` from every field.
    pub fn redacted(self, credential: Option<&Credential>) -> Self {
        let Some(credential) = credential else {
            return self;
        };
        Self {
            code: self.code,
            banner: credential.redact(&self.banner),
            hint: credential.redact(&self.hint),
            detail: self.detail.map(|d| credential.redact(&d)),
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.banner, self.hint)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n({})", detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_hint_mentions_credential() {
        let err = PipelineError::from(GenerationError::new(
            GenerationErrorKind::Auth,
            "401 Unauthorized",
        ));
        let n = err.notification();
        assert_eq!(n.code, "generation_failed");
        assert!(n.hint.contains("credential configuration"));
        assert!(!n.banner.is_empty());
    }

    #[test]
    fn test_retrieval_and_generation_are_distinguished() {
        let r = PipelineError::Retrieval("embed failed".into()).notification();
        let g = PipelineError::GenerationTimeout(Duration::from_secs(5)).notification();
        assert_ne!(r.banner, g.banner);
        assert_ne!(r.code, g.code);

        let rt = PipelineError::RetrievalTimeout(Duration::from_secs(5)).notification();
        assert_ne!(rt.code, g.code);
        assert_eq!(rt.code, "retrieval_timeout");
        assert_eq!(g.code, "generation_timeout");
    }

    #[test]
    fn test_redacted_scrubs_detail() {
        let cred = Credential::new("gsk_abc");
        let err = PipelineError::from(GenerationError::new(
            GenerationErrorKind::Auth,
            "invalid key gsk_abc",
        ));
        let n = err.notification().redacted(Some(&cred));
        let text = n.to_string();
        assert!(!text.contains("gsk_abc"));
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn test_timeout_display() {
        let err = PipelineError::RetrievalTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "retrieval timed out after 30s");
        assert_eq!(err.code(), "retrieval_timeout");
    }
}
