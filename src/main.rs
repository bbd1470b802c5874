//! # Medibot CLI (`medibot`)
//!
//! Ask medical questions against a pre-built document index.
//!
//! ## Usage
//!
//! ```bash
//! medibot --config ./config/medibot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `medibot ask "<question>"` | Answer one question and exit |
//! | `medibot chat` | Interactive chat session |
//! | `medibot serve` | Start the HTTP server |
//! | `medibot index` | Show statistics of the document index |
//!
//! ## Examples
//!
//! ```bash
//! # One-shot question
//! medibot ask "What are the symptoms of diabetes?"
//!
//! # Chat with a custom config and debug logging
//! medibot --config ./config/medibot.toml --verbose chat
//! ```
//!
//! The API key is read from the environment variable named by
//! `[generation].api_key_env` (default `GROQ_API_KEY`); a `.env` file in the
//! working directory is loaded first.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use medibot::config::{self, Config};
use medibot::generator::ChatCompletionsGenerator;
use medibot::index::{load_index, LoadedIndex};
use medibot::pipeline::{expected_dims, Pipeline};
use medibot::{chat, embedding, server};

const DEFAULT_CONFIG: &str = "./config/medibot.toml";

/// Medibot: evidence-based answers to medical questions, with sources.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/medibot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "medibot",
    about = "Medibot: a retrieval-augmented medical question-answering assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/medibot.toml`; built-in defaults are used when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline details to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question and exit.
    Ask {
        /// The medical question.
        question: String,
    },

    /// Start an interactive chat session.
    ///
    /// Ctrl-C cancels the question being answered; `/quit` exits.
    Chat,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Load the document index and print its statistics.
    Index,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "medibot=debug,tower_http=debug"
    } else {
        "medibot=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => {
            debug!("no config file, using defaults");
            Ok(Config::default())
        }
    }
}

/// Load the index. On failure the returned error carries the banner and hint,
/// and `main` reports it.
async fn open_index(cfg: &Config) -> anyhow::Result<LoadedIndex> {
    load_index(&cfg.index.path, expected_dims(cfg))
        .await
        .map_err(|e| {
            let n = e.notification();
            anyhow::Error::new(e).context(format!("{}\n{}", n.banner, n.hint))
        })
}

async fn build_pipeline(cfg: &Config) -> anyhow::Result<Pipeline> {
    // The index comes first so that a missing index fails before any model is loaded.
    let loaded = open_index(cfg).await?;

    let embedder = embedding::create_provider(&cfg.embedding)
        .await
        .context("Failed to initialize embedding provider")?;
    let generator = ChatCompletionsGenerator::from_config(&cfg.generation)
        .context("Failed to initialize answer generator")?;

    Ok(Pipeline::from_loaded(cfg, loaded, embedder, Arc::new(generator)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    init_logging(cli.verbose);

    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask { question } => {
            let pipeline = build_pipeline(&cfg).await?;
            chat::run_ask(&pipeline, &question).await?;
        }
        Commands::Chat => {
            let pipeline = build_pipeline(&cfg).await?;
            chat::run_chat(&pipeline).await?;
        }
        Commands::Serve => {
            let pipeline = build_pipeline(&cfg).await?;
            server::run_server(&cfg, Arc::new(pipeline)).await?;
        }
        Commands::Index => {
            let loaded = open_index(&cfg).await?;
            let stats = &loaded.stats;
            println!("Index:   {}", cfg.index.path.display());
            println!("Chunks:  {}", stats.chunks);
            println!(
                "Dims:    {}",
                stats.dims.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
            );
            println!("Model:   {}", stats.model.as_deref().unwrap_or("-"));
            println!("Sources: {}", stats.sources);
        }
    }

    Ok(())
}
