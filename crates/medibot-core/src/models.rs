//! Core data models that flow through the question-answering pipeline.
//!
//! A question is answered by retrieving [`DocumentChunk`]s (collected in a
//! [`RetrievalResult`]), generating text from them, and packaging the result
//! as an [`AnswerRecord`]. [`ConversationTurn`]s make up a session transcript.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::format::format_response;

/// Source name used when a chunk carries no `source` metadata.
pub const DEFAULT_SOURCE_NAME: &str = "Medical Encyclopedia";

/// Page reference of a retrieved chunk.
///
/// Document loaders record a numeric page; anything else (missing key,
/// non-numeric value) degrades to [`PageRef::Unknown`], which displays as
/// `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageRef {
    Number(i64),
    Unknown,
}

impl PageRef {
    /// Read the `page` key of a chunk's metadata object.
    pub fn from_metadata(metadata: &serde_json::Value) -> Self {
        match metadata.get("page") {
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(PageRef::Number)
                .unwrap_or(PageRef::Unknown),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(PageRef::Number)
                .unwrap_or(PageRef::Unknown),
            _ => PageRef::Unknown,
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Number(n) => write!(f, "{}", n),
            PageRef::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Strip directory components from a source path, keeping the filename.
///
/// Both `/` and `\` count as separators so that indexes built on Windows
/// display the same way.
pub fn source_file_name(source: &str) -> &str {
    source.rsplit(['/', '\\']).next().unwrap_or(source)
}

/// A retrieved passage with its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    /// Filename only, directory stripped.
    pub source_name: String,
    pub page: PageRef,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, source_name: impl Into<String>, page: PageRef) -> Self {
        Self {
            text: text.into(),
            source_name: source_name.into(),
            page,
        }
    }

    /// Build a chunk from its text and index metadata.
    ///
    /// Never fails: a missing `source` falls back to
    /// [`DEFAULT_SOURCE_NAME`] and a missing or malformed `page` to
    /// [`PageRef::Unknown`].
    pub fn from_metadata(text: impl Into<String>, metadata: &serde_json::Value) -> Self {
        let source_name = metadata
            .get("source")
            .and_then(|s| s.as_str())
            .map(source_file_name)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SOURCE_NAME);

        Self {
            text: text.into(),
            source_name: source_name.to_string(),
            page: PageRef::from_metadata(metadata),
        }
    }
}

/// Ordered chunks returned for one query, most similar first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<DocumentChunk>,
}

impl RetrievalResult {
    pub fn new(chunks: Vec<DocumentChunk>) -> Self {
        Self { chunks }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentChunk> {
        self.chunks.iter()
    }
}

impl From<Vec<DocumentChunk>> for RetrievalResult {
    fn from(chunks: Vec<DocumentChunk>) -> Self {
        Self::new(chunks)
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a DocumentChunk;
    type IntoIter = std::slice::Iter<'a, DocumentChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

/// Token accounting reported by the LLM service, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The outcome of one successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerRecord {
    /// Generated text as returned by the service.
    pub answer: String,
    pub sources: RetrievalResult,
    pub usage: Option<Usage>,
    /// `clean(answer) + sources block + disclaimer`.
    pub display: String,
}

impl AnswerRecord {
    pub fn new(answer: String, sources: RetrievalResult, usage: Option<Usage>) -> Self {
        let display = format_response(&answer, &sources);
        Self {
            answer,
            sources,
            usage,
            display,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One entry of a session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
