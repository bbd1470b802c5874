//! The retrieval-augmented answer pipeline.
//!
//! ```text
//! question ──▶ Retriever ──▶ PromptTemplate ──▶ AnswerGenerator ──▶ format_response
//!              (embed+search)   (render)          (LLM call)          (sources+disclaimer)
//! ```
//!
//! A [`Pipeline`] is built once at startup by [`Pipeline::open`], which loads
//! the index before anything else, and is then shared by reference (or
//! `Arc`) with every request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use medibot_core::embedding::EmbeddingProvider;
use medibot_core::error::PipelineError;
use medibot_core::generate::AnswerGenerator;
use medibot_core::index::VectorIndex;
use medibot_core::models::{AnswerRecord, RetrievalResult};
use medibot_core::prompt::PromptTemplate;
use medibot_core::secret::Credential;

use crate::config::Config;
use crate::index::{load_index, IndexStats, LoadedIndex};
use crate::retriever::Retriever;

/// Why a bounded call did not finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut,
    Cancelled,
}

/// Await `fut` unless `timeout` elapses or `cancel` fires first.
pub async fn bounded<F: Future>(
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, Interrupted> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        res = tokio::time::timeout(timeout, fut) => res.map_err(|_| Interrupted::TimedOut),
    }
}

/// Vector width the configured embedding provider produces, if known.
pub fn expected_dims(config: &Config) -> Option<usize> {
    if config.embedding.is_enabled() {
        config.embedding.dims
    } else {
        None
    }
}

pub struct Pipeline {
    retriever: Retriever,
    generator: Arc<dyn AnswerGenerator>,
    template: PromptTemplate,
    k: usize,
    generation_timeout: Duration,
    credential: Option<Credential>,
    stats: Option<IndexStats>,
}

impl Pipeline {
    /// Assemble a pipeline from already-constructed collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn AnswerGenerator>,
        template: PromptTemplate,
        k: usize,
        retrieval_timeout: Duration,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            retriever: Retriever::new(embedder, index, retrieval_timeout),
            generator,
            template,
            k,
            generation_timeout,
            credential: None,
            stats: None,
        }
    }

    /// Credential to scrub from notifications.
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// Load the index named by `config` and assemble the pipeline.
    ///
    /// The index is loaded first: if it is unavailable this returns
    /// [`PipelineError::IndexUnavailable`] and neither `embedder` nor
    /// `generator` is ever called.
    pub async fn open(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Result<Self, PipelineError> {
        let loaded = load_index(&config.index.path, expected_dims(config)).await?;
        Ok(Self::from_loaded(config, loaded, embedder, generator))
    }

    /// Assemble the pipeline around an index that is already in memory.
    pub fn from_loaded(
        config: &Config,
        loaded: LoadedIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        // load_config has already validated the template
        let template = config.prompt.template().unwrap_or_else(|e| {
            warn!(error = %e, "invalid prompt template, using the built-in one");
            PromptTemplate::default()
        });

        let mut pipeline = Self::new(
            embedder,
            Arc::new(loaded.index),
            generator,
            template,
            config.retrieval.k,
            Duration::from_secs(config.retrieval.timeout_secs),
            Duration::from_secs(config.generation.timeout_secs),
        )
        .with_credential(config.generation.resolve_credential());
        pipeline.stats = Some(loaded.stats);
        pipeline
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn index_stats(&self) -> Option<&IndexStats> {
        self.stats.as_ref()
    }

    pub async fn retrieve(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult, PipelineError> {
        self.retriever.retrieve(question, self.k, cancel).await
    }

    /// Answer `question`: retrieve, build the prompt, generate, format.
    ///
    /// Returns an [`AnswerRecord`] only when every stage succeeded.
    pub async fn answer(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<AnswerRecord, PipelineError> {
        let sources = self.retrieve(question, cancel).await?;

        let prompt = self.template.render(&sources, question);
        debug!(
            chunks = sources.len(),
            prompt_chars = prompt.len(),
            "built prompt"
        );

        let generation = bounded(self.generation_timeout, cancel, self.generator.generate(&prompt))
            .await
            .map_err(|why| match why {
                Interrupted::TimedOut => PipelineError::GenerationTimeout(self.generation_timeout),
                Interrupted::Cancelled => PipelineError::Cancelled,
            })??;

        info!(
            model = self.generator.model_name(),
            sources = sources.len(),
            answer_chars = generation.text.len(),
            "answered question"
        );

        Ok(AnswerRecord::new(generation.text, sources, generation.usage))
    }
}
