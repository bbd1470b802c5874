//! # Medibot Core
//!
//! Runtime-free logic for Medibot: data models, prompt building, response
//! formatting, conversation state, error taxonomy, and the traits behind
//! which the embedding model, vector index, and LLM service sit.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! providers and the SQLite index loader live in the `medibot` app crate.

pub mod embedding;
pub mod error;
pub mod format;
pub mod generate;
pub mod index;
pub mod models;
pub mod prompt;
pub mod secret;
pub mod session;
