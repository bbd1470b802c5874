//! Response formatting: cleaned answer, source citations, and disclaimer.
//!
//! The displayed message for every successful answer is
//!
//! ```text
//! <trimmed answer>
//!
//! **📚 Sources:**
//! 📄 encyclopedia.pdf (Page 12)
//!
//! 📄 encyclopedia.pdf (Page 45)
//!
//! ⚠️ **Disclaimer:** ...
//! ```
//!
//! The sources block disappears entirely when nothing was retrieved.

use crate::models::{DocumentChunk, RetrievalResult};

/// Maximum number of sources shown under an answer, independent of the
/// retrieval `k`.
pub const MAX_DISPLAYED_SOURCES: usize = 3;

/// Appended verbatim to every answer.
pub const DISCLAIMER: &str = "\n\n⚠️ **Disclaimer:** This information is for educational purposes only. Always consult with healthcare professionals for medical advice.";

const SOURCES_HEADING: &str = "\n\n**📚 Sources:**\n";
const DOCUMENT_MARKER: &str = "📄";

/// Render one citation line: `📄 <source> (Page <page>)`.
pub fn format_source(chunk: &DocumentChunk) -> String {
    format!(
        "{} {} (Page {})",
        DOCUMENT_MARKER, chunk.source_name, chunk.page
    )
}

/// Build the sources block, or an empty string when `chunks` is empty.
pub fn format_sources(chunks: &RetrievalResult) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let lines: Vec<String> = chunks
        .iter()
        .take(MAX_DISPLAYED_SOURCES)
        .map(format_source)
        .collect();

    format!("{}{}", SOURCES_HEADING, lines.join("\n\n"))
}

/// Compose the displayed message for an answer.
pub fn format_response(answer: &str, chunks: &RetrievalResult) -> String {
    let mut out = answer.trim().to_string();
    out.push_str(&format_sources(chunks));
    out.push_str(DISCLAIMER);
    out
}
