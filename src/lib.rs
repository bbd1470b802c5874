//! # Medibot
//!
//! A retrieval-augmented medical question-answering assistant.
//!
//! A question is embedded, matched against a pre-built index of medical
//! reference chunks, and answered by an LLM that is only given those chunks
//! as context. Every answer is shown with up to three cited sources and a
//! fixed medical disclaimer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐   ┌────────────┐
//! │ Session  │──▶│ Retriever │──▶│ Prompt + LLM │──▶│ Formatter  │
//! │ (chat)   │   │ embed+knn │   │ (generator)  │   │ sources +  │
//! └──────────┘   └─────┬─────┘   └──────────────┘   │ disclaimer │
//!                      │                            └────────────┘
//!                ┌─────┴─────┐
//!                │  SQLite   │  loaded once at startup
//!                │  index    │
//!                └───────────┘
//! ```
//!
//! Runtime-free domain logic (formatting, prompt rendering, sessions, the
//! in-memory index) lives in the `medibot-core` crate; this crate wires it to
//! tokio, sqlx, reqwest and axum.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`index`] | Loading the SQLite document index |
//! | [`embedding`] | Query embedding providers |
//! | [`retriever`] | Question → top-k chunks |
//! | [`generator`] | OpenAI-compatible chat-completions client |
//! | [`pipeline`] | Retrieve, prompt, generate, format |
//! | [`chat`] | Session driver and terminal chat |
//! | [`server`] | HTTP server |

pub mod chat;
pub mod config;
pub mod embedding;
pub mod generator;
pub mod index;
pub mod pipeline;
pub mod retriever;
pub mod server;
