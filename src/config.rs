//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! that reads `vectorstore/db.sqlite`, embeds queries locally with
//! `all-minilm-l6-v2`, and answers through Groq. See `config/medibot.example.toml`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use medibot_core::generate::{ModelConfig, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use medibot_core::prompt::PromptTemplate;
use medibot_core::secret::Credential;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("vectorstore/db.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question.
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

fn default_k() -> usize {
    3
}
fn default_retrieval_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("all-minilm-l6-v2".to_string())
}
fn default_dims() -> Option<usize> {
    Some(384)
}
fn default_max_retries() -> u32 {
    2
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_generation_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_generation_timeout() -> u64 {
    60
}

impl GenerationConfig {
    /// Resolve the credential from the process environment.
    ///
    /// Returns `None` when the variable is unset or blank; generation then
    /// fails per request with an authentication error instead of aborting
    /// startup.
    pub fn resolve_credential(&self) -> Option<Credential> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Credential::new)
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            credential: self.resolve_credential(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    /// Overrides the built-in template. Must contain `{context}` and `{question}`.
    #[serde(default)]
    pub template: Option<String>,
}

impl PromptConfig {
    pub fn template(&self) -> Result<PromptTemplate> {
        match &self.template {
            Some(t) => PromptTemplate::new(t).context("invalid prompt.template"),
            None => Ok(PromptTemplate::default()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Sessions unused for this long are dropped.
    #[serde(default = "default_session_idle")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_idle_secs: default_session_idle(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_session_idle() -> u64 {
    3600
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.timeout_secs == 0 {
        bail!("retrieval.timeout_secs must be > 0");
    }

    if !(0.0..=1.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 1.0]");
    }

    if config.generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be > 0");
    }

    if config.generation.model.trim().is_empty() {
        bail!("generation.model must not be empty");
    }

    if config.server.session_idle_secs == 0 {
        bail!("server.session_idle_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    config.prompt.template()?;

    Ok(())
}
