//! Loading the pre-built document index.
//!
//! The index is a SQLite file produced by an offline ingestion job. Medibot
//! only reads it, once, at startup, and keeps every vector in a
//! [`FlatIndex`] shared by all requests.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE chunks (
//!     id            INTEGER PRIMARY KEY,
//!     text          TEXT NOT NULL,
//!     metadata_json TEXT,          -- {"source": "data/encyclopedia.pdf", "page": 12}
//!     embedding     BLOB NOT NULL  -- little-endian f32
//! );
//! -- optional
//! CREATE TABLE index_meta (key TEXT PRIMARY KEY, value TEXT);  -- "dims", "model"
//! ```
//!
//! Any failure here is [`PipelineError::IndexUnavailable`]: the file is
//! missing, not a database, lacks the `chunks` table, or holds vectors of a
//! different dimension than the configured embedding model.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

use medibot_core::embedding::blob_to_vec;
use medibot_core::error::PipelineError;
use medibot_core::index::FlatIndex;

/// Summary of a loaded index, for `medibot index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub chunks: usize,
    pub dims: Option<usize>,
    /// Embedding model recorded by the index builder, if any.
    pub model: Option<String>,
    pub sources: usize,
}

/// A loaded index plus what its `index_meta` table declared.
pub struct LoadedIndex {
    pub index: FlatIndex,
    pub stats: IndexStats,
}

async fn connect_read_only(path: &Path) -> Result<SqlitePool, PipelineError> {
    let unavailable = |reason: String| PipelineError::index_unavailable(path.display().to_string(), reason);

    if !path.is_file() {
        return Err(unavailable("file does not exist".to_string()));
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| unavailable(format!("cannot open database: {}", e)))
}

/// Load every chunk of the index at `path`.
///
/// When `expected_dims` is given, a vector of any other length is an
/// incompatible index.
pub async fn load_index(path: &Path, expected_dims: Option<usize>) -> Result<LoadedIndex, PipelineError> {
    let unavailable = |reason: String| PipelineError::index_unavailable(path.display().to_string(), reason);

    let pool = connect_read_only(path).await?;

    let meta = read_meta(&pool).await;
    let declared_dims = meta
        .iter()
        .find(|(k, _)| k == "dims")
        .and_then(|(_, v)| v.trim().parse::<usize>().ok());
    let model = meta
        .iter()
        .find(|(k, _)| k == "model")
        .map(|(_, v)| v.clone());

    if let (Some(declared), Some(expected)) = (declared_dims, expected_dims) {
        if declared != expected {
            pool.close().await;
            return Err(unavailable(format!(
                "index was built with {}-dimensional embeddings, embedding model produces {}",
                declared, expected
            )));
        }
    }

    let rows = sqlx::query("SELECT text, metadata_json, embedding FROM chunks ORDER BY id")
        .fetch_all(&pool)
        .await
        .map_err(|e| unavailable(format!("cannot read chunks: {}", e)));
    pool.close().await;
    let rows = rows?;

    let mut index = FlatIndex::new();
    let mut sources = std::collections::BTreeSet::new();

    for (i, row) in rows.iter().enumerate() {
        let text: String = row
            .try_get("text")
            .map_err(|e| unavailable(format!("row {}: {}", i, e)))?;
        let metadata_json: Option<String> = row
            .try_get("metadata_json")
            .map_err(|e| unavailable(format!("row {}: {}", i, e)))?;
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| unavailable(format!("row {}: {}", i, e)))?;

        // Malformed metadata degrades to an empty object; display falls back to sentinels.
        let metadata: serde_json::Value = metadata_json
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
            .filter(|v: &serde_json::Value| v.is_object())
            .unwrap_or_else(|| serde_json::json!({}));

        if let Some(source) = metadata.get("source").and_then(|s| s.as_str()) {
            sources.insert(source.to_string());
        }

        let vector = blob_to_vec(&blob);
        if let Some(expected) = expected_dims {
            if vector.len() != expected {
                return Err(unavailable(format!(
                    "row {} has a {}-dimensional embedding, expected {}",
                    i,
                    vector.len(),
                    expected
                )));
            }
        }

        index
            .push(text, metadata, vector)
            .map_err(|e| unavailable(format!("row {}: {}", i, e)))?;
    }

    let stats = IndexStats {
        chunks: rows.len(),
        dims: medibot_core::index::VectorIndex::dims(&index),
        model,
        sources: sources.len(),
    };

    info!(
        path = %path.display(),
        chunks = stats.chunks,
        dims = ?stats.dims,
        "loaded document index"
    );

    Ok(LoadedIndex { index, stats })
}

/// Read `index_meta`, treating a missing table as empty.
async fn read_meta(pool: &SqlitePool) -> Vec<(String, String)> {
    match sqlx::query("SELECT key, value FROM index_meta")
        .fetch_all(pool)
        .await
    {
        Ok(rows) => rows
            .iter()
            .filter_map(|r| {
                let key: String = r.try_get("key").ok()?;
                let value: String = r.try_get("value").ok()?;
                Some((key, value))
            })
            .collect(),
        Err(e) => {
            debug!(error = %e, "no index_meta table");
            Vec::new()
        }
    }
}
