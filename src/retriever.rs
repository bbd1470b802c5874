//! Query → top-k document chunks.
//!
//! The [`Retriever`] embeds the question, searches the shared index, and maps
//! each hit's metadata to a [`DocumentChunk`]. Both external calls run under
//! the retrieval timeout and the caller's cancellation token.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use medibot_core::embedding::EmbeddingProvider;
use medibot_core::error::PipelineError;
use medibot_core::index::VectorIndex;
use medibot_core::models::{DocumentChunk, RetrievalResult};

use crate::pipeline::{bounded, Interrupted};

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            timeout,
        }
    }

    fn interrupted(&self, why: Interrupted) -> PipelineError {
        match why {
            Interrupted::TimedOut => PipelineError::RetrievalTimeout(self.timeout),
            Interrupted::Cancelled => PipelineError::Cancelled,
        }
    }

    /// Return at most `k` chunks for `query`, most similar first.
    ///
    /// `k == 0` short-circuits without touching the embedder or the index.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult, PipelineError> {
        if k == 0 {
            return Ok(RetrievalResult::empty());
        }

        let vector = bounded(self.timeout, cancel, self.embedder.embed(query))
            .await
            .map_err(|why| self.interrupted(why))?
            .map_err(|e| PipelineError::Retrieval(format!("embedding failed: {:#}", e)))?;

        if let Some(dims) = self.index.dims() {
            if vector.len() != dims {
                return Err(PipelineError::Retrieval(format!(
                    "query embedding has {} dimensions, index has {}",
                    vector.len(),
                    dims
                )));
            }
        }

        let hits = bounded(self.timeout, cancel, self.index.search(&vector, k))
            .await
            .map_err(|why| self.interrupted(why))?
            .map_err(|e| PipelineError::Retrieval(format!("index search failed: {:#}", e)))?;

        debug!(
            k,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieved context"
        );

        let chunks: Vec<DocumentChunk> = hits
            .into_iter()
            .take(k)
            .map(|h| DocumentChunk::from_metadata(h.text, &h.metadata))
            .collect();

        Ok(RetrievalResult::new(chunks))
    }
}
