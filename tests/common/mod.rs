#![allow(dead_code)]

use async_trait::async_trait;
use medibot_core::embedding::{vec_to_blob, EmbeddingProvider};
use medibot_core::generate::{AnswerGenerator, Generation, GenerationError};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Write a SQLite index with the given rows to `path`.
pub async fn build_index(path: &Path, rows: &[(&str, Value, Vec<f32>)], dims: Option<usize>) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();

    sqlx::query(
        "CREATE TABLE chunks (id INTEGER PRIMARY KEY, text TEXT NOT NULL, metadata_json TEXT, embedding BLOB NOT NULL)",
    )
    .execute(&pool)
    .await
    .unwrap();

    for (text, metadata, vector) in rows {
        sqlx::query("INSERT INTO chunks (text, metadata_json, embedding) VALUES (?, ?, ?)")
            .bind(*text)
            .bind(metadata.to_string())
            .bind(vec_to_blob(vector))
            .execute(&pool)
            .await
            .unwrap();
    }

    if let Some(dims) = dims {
        sqlx::query("CREATE TABLE index_meta (key TEXT PRIMARY KEY, value TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO index_meta (key, value) VALUES ('dims', ?), ('model', 'test-axis')")
            .bind(dims.to_string())
            .execute(&pool)
            .await
            .unwrap();
    }

    pool.close().await;
}

/// Three chunks about diabetes and one about asthma, on two axes.
pub fn medical_rows() -> Vec<(&'static str, Value, Vec<f32>)> {
    vec![
        (
            "Diabetes symptoms include excessive thirst and frequent urination.",
            json!({"source": "data/encyclopedia.pdf", "page": 12}),
            vec![1.0, 0.05],
        ),
        (
            "Asthma is a chronic disease of the airways.",
            json!({"source": "data/encyclopedia.pdf", "page": 3}),
            vec![0.0, 1.0],
        ),
        (
            "Blood glucose testing confirms a diabetes diagnosis.",
            json!({"source": "data/encyclopedia.pdf", "page": 45}),
            vec![0.9, 0.1],
        ),
        (
            "Type 2 diabetes is linked to insulin resistance.",
            json!({"page": 7}),
            vec![0.8, 0.2],
        ),
    ]
}

/// Maps questions mentioning diabetes to the first axis, everything else to the second.
#[derive(Default)]
pub struct AxisEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for AxisEmbedder {
    fn model_name(&self) -> &str {
        "test-axis"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(if text.to_lowercase().contains("diabetes") {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        })
    }
}

/// Replays one outcome and remembers the last prompt it was given.
pub struct ScriptedGenerator {
    outcome: Result<Generation, GenerationError>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl ScriptedGenerator {
    pub fn answering(text: &str) -> Self {
        Self::new(Ok(Generation {
            text: text.to_string(),
            usage: None,
        }))
    }

    pub fn failing(err: GenerationError) -> Self {
        Self::new(Err(err))
    }

    fn new(outcome: Result<Generation, GenerationError>) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn spawn_mock(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
