//! Prompt construction from a template, retrieved context, and the question.
//!
//! Templates carry two named placeholders, `{context}` and `{question}`.
//! Rendering is single-pass, so braces that appear inside retrieved text or
//! the question are copied through untouched.

use anyhow::{bail, Result};

use crate::models::RetrievalResult;

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

/// The default instruction template for the medical assistant.
pub const DEFAULT_TEMPLATE: &str = "
You are a knowledgeable medical AI assistant. Use the provided medical information to answer the user's question clearly and professionally.

INSTRUCTIONS:
- Provide accurate, well-structured medical information
- Use clear, professional language
- Break down complex concepts when needed
- If you don't know something from the context, say so honestly
- Do not provide personal medical advice or diagnosis
- Always remind users to consult healthcare professionals for serious concerns

Context: {context}

Question: {question}

Answer:";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse `template`, requiring both `{context}` and `{question}`.
    pub fn new(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut saw_context = false;
        let mut saw_question = false;

        loop {
            let next = [
                (rest.find(CONTEXT_PLACEHOLDER), Segment::Context),
                (rest.find(QUESTION_PLACEHOLDER), Segment::Question),
            ]
            .into_iter()
            .filter_map(|(pos, seg)| pos.map(|p| (p, seg)))
            .min_by_key(|(p, _)| *p);

            match next {
                Some((pos, seg)) => {
                    if pos > 0 {
                        segments.push(Segment::Literal(rest[..pos].to_string()));
                    }
                    let len = match seg {
                        Segment::Context => {
                            saw_context = true;
                            CONTEXT_PLACEHOLDER.len()
                        }
                        _ => {
                            saw_question = true;
                            QUESTION_PLACEHOLDER.len()
                        }
                    };
                    segments.push(seg);
                    rest = &rest[pos + len..];
                }
                None => {
                    if !rest.is_empty() {
                        segments.push(Segment::Literal(rest.to_string()));
                    }
                    break;
                }
            }
        }

        if !saw_context {
            bail!("prompt template must contain a {} placeholder", CONTEXT_PLACEHOLDER);
        }
        if !saw_question {
            bail!("prompt template must contain a {} placeholder", QUESTION_PLACEHOLDER);
        }

        Ok(Self { segments })
    }

    /// Render the prompt for `question` grounded on `chunks`.
    ///
    /// Chunk texts are joined with `\n` in retrieval order.
    pub fn render(&self, chunks: &RetrievalResult, question: &str) -> String {
        let context = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Context => out.push_str(&context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE).expect("default template contains both placeholders")
    }
}

/// Parse `template` and render it in one call.
pub fn build_prompt(template: &str, chunks: &RetrievalResult, question: &str) -> Result<String> {
    Ok(PromptTemplate::new(template)?.render(chunks, question))
}
