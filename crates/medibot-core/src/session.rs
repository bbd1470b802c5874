//! Conversation session state.
//!
//! A [`ConversationSession`] owns one user's transcript and enforces the
//! request lifecycle:
//!
//! ```text
//!          submit(question)             complete(display)
//!   Idle ─────────────────▶ AwaitingAnswer ─────────────────▶ Idle
//!                                  │
//!                                  └──── fail() ────────────▶ Idle
//! ```
//!
//! The user turn is appended on `submit`, before any answer exists. A failed
//! request appends nothing more, so the unanswered question stays last.

use serde::Serialize;
use thiserror::Error;

use crate::models::ConversationTurn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a question is already being answered in this session")]
    Busy,
    #[error("no question is awaiting an answer")]
    NotAwaiting,
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    turns: Vec<ConversationTurn>,
    state: SessionState,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            turns: Vec::new(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The question currently awaiting an answer.
    pub fn pending_question(&self) -> Option<&str> {
        match self.state {
            SessionState::AwaitingAnswer => self.turns.last().map(|t| t.content.as_str()),
            SessionState::Idle => None,
        }
    }

    /// Record the user's question and start waiting for an answer.
    pub fn submit(&mut self, question: impl Into<String>) -> Result<(), SessionError> {
        if self.state == SessionState::AwaitingAnswer {
            return Err(SessionError::Busy);
        }
        self.turns.push(ConversationTurn::user(question));
        self.state = SessionState::AwaitingAnswer;
        Ok(())
    }

    /// Record the assistant's displayed answer.
    pub fn complete(&mut self, display: impl Into<String>) -> Result<&ConversationTurn, SessionError> {
        if self.state != SessionState::AwaitingAnswer {
            return Err(SessionError::NotAwaiting);
        }
        self.turns.push(ConversationTurn::assistant(display));
        self.state = SessionState::Idle;
        Ok(&self.turns[self.turns.len() - 1])
    }

    /// Abandon the pending question without an answer.
    pub fn fail(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingAnswer {
            return Err(SessionError::NotAwaiting);
        }
        self.state = SessionState::Idle;
        Ok(())
    }

    /// End the session, discarding the transcript.
    pub fn end(&mut self) {
        self.turns.clear();
        self.state = SessionState::Idle;
    }
}
