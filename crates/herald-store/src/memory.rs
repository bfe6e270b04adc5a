//! Long-term memory table with embedding similarity retrieval.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use herald_pipeline::{CollaboratorError, Embedder, Embedding, Memory, MemoryRecord};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::StoreError;
use crate::db::{connect, parse_timestamp};

/// Default number of memories returned per retrieval.
pub const DEFAULT_RETRIEVE_LIMIT: usize = 5;

/// Cosine similarity of two vectors.
///
/// Returns `None` when the vectors are empty, of different lengths, or either
/// has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Result<Embedding, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt {
            table: "memories",
            reason: format!("embedding blob of {} bytes", blob.len()),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// SQLite-backed long-term memory.
pub struct SqliteMemory {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    retrieve_limit: usize,
}

impl SqliteMemory {
    pub fn open(
        path: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        retrieve_limit: usize,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            conn: Mutex::new(connect(&path.into())?),
            embedder,
            retrieve_limit,
        })
    }

    /// Insert a memory row.
    pub fn insert(
        &self,
        content: &str,
        embedding: &[f32],
        significance: u8,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO memories (content, embedding, significance, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                content,
                encode_embedding(embedding),
                significance,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!(significance, dims = embedding.len(), "memory stored");
        Ok(())
    }

    /// The `limit` memories most similar to `query`, best first.
    ///
    /// Rows whose embedding cannot be compared with `query` are skipped.
    pub fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<MemoryRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt =
            conn.prepare("SELECT content, embedding, significance, created_at FROM memories")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, u8>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (content, blob, significance, created_at) = row?;
            let Some(relevance) = cosine_similarity(query, &decode_embedding(&blob)?) else {
                continue;
            };
            scored.push(MemoryRecord {
                content,
                significance,
                relevance: Some(relevance),
                created_at: parse_timestamp("memories", &created_at)?,
            });
        }

        scored.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(conn.query_row("SELECT COUNT(*) FROM memories", [], |row| {
            row.get::<_, usize>(0)
        })?)
    }
}

#[async_trait]
impl Memory for SqliteMemory {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError> {
        self.embedder.embed(text).await
    }

    async fn retrieve_relevant(
        &self,
        embedding: &Embedding,
    ) -> Result<Vec<MemoryRecord>, CollaboratorError> {
        Ok(self.nearest(embedding, self.retrieve_limit)?)
    }

    async fn store(
        &self,
        content: &str,
        embedding: &Embedding,
        significance: u8,
    ) -> Result<(), CollaboratorError> {
        Ok(self.insert(content, embedding, significance)?)
    }
}
