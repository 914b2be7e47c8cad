//! Vector index adapter.
//!
//! A [`VectorIndex`] binds an [`Embedder`] to a named collection inside a
//! SQLite file. Records are stored with their vectors as little-endian f32
//! BLOBs; search embeds the query and ranks every record of the collection
//! by cosine similarity, breaking ties by insertion order.
//!
//! Writes are committed (and synced, see [`crate::db::connect`]) before
//! [`VectorIndex::add_documents`] returns, which the indexing pipeline
//! relies on before it records a digest in the ledger.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::config::IndexConfig;
use crate::db;
use crate::embedding::{self, Embedder};
use crate::migrate;
use crate::models::{EmbeddingRecord, SearchHit};

pub struct VectorIndex {
    pool: SqlitePool,
    collection: String,
    embedder: Box<dyn Embedder>,
    default_k: usize,
}

impl VectorIndex {
    /// Opens the storage and binds the collection, creating either if
    /// missing. Existing content is never touched.
    pub async fn initialize(config: &IndexConfig, embedder: Box<dyn Embedder>) -> Result<Self> {
        tracing::info!("Initializing vector index on: {}", config.path.display());

        let pool = db::connect(&config.path).await?;
        migrate::run_migrations(&pool)
            .await
            .context("Failed to prepare index schema")?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT model FROM collections WHERE name = ?")
                .bind(&config.collection)
                .fetch_optional(&pool)
                .await?;

        match existing {
            None => {
                sqlx::query("INSERT INTO collections (name, model, created_at) VALUES (?, ?, ?)")
                    .bind(&config.collection)
                    .bind(embedder.model_name())
                    .bind(chrono::Utc::now().timestamp())
                    .execute(&pool)
                    .await?;
            }
            Some(model) if model != embedder.model_name() => {
                tracing::warn!(
                    "Collection '{}' was built with model '{}' but '{}' is configured; \
                     similarity between old and new vectors is meaningless",
                    config.collection,
                    model,
                    embedder.model_name()
                );
            }
            Some(_) => {}
        }

        let index = Self {
            pool,
            collection: config.collection.clone(),
            embedder,
            default_k: config.search_k,
        };

        tracing::info!(
            "Vector index initialized (collection '{}', {} records).",
            index.collection,
            index.count().await?
        );
        Ok(index)
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Smoke-tests the index with a similarity search for `probe`.
    ///
    /// Returns the previews it logged. An empty result is reported, not
    /// treated as an error.
    pub async fn verify(&self, probe: &str, preview_chars: usize) -> Result<Vec<String>> {
        tracing::info!("Verifying index content with query: {}", probe);

        let hits = self.search(probe, self.default_k).await?;
        if hits.is_empty() {
            tracing::info!("No embeddings found for this query.");
            return Ok(Vec::new());
        }

        let total = hits.len();
        let previews: Vec<String> = hits.iter().map(|h| h.preview(preview_chars)).collect();
        for (i, preview) in previews.iter().enumerate() {
            tracing::info!("Record {} of {} found: {}", i + 1, total, preview);
        }
        Ok(previews)
    }

    /// Persists `records` in one transaction.
    pub async fn add_documents(&self, records: &[EmbeddingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO records (id, collection, source, fragment_index, content,
                                     content_hash, file_digest, dims, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&self.collection)
            .bind(&record.source)
            .bind(record.fragment_index)
            .bind(&record.content)
            .bind(&record.content_hash)
            .bind(&record.file_digest)
            .bind(record.vector.len() as i64)
            .bind(embedding::vec_to_blob(&record.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Top-`k` records by cosine similarity to `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let query_vec = embedding::embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, source, fragment_index, content, embedding
            FROM records
            WHERE collection = ?
            ORDER BY seq
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                SearchHit {
                    id: row.get("id"),
                    source: row.get("source"),
                    fragment_index: row.get("fragment_index"),
                    content: row.get("content"),
                    score: embedding::cosine_similarity(&query_vec, &vec),
                }
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Number of distinct source files with at least one record.
    pub async fn source_count(&self) -> Result<i64> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM records WHERE collection = ?")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(n)
    }

    /// Number of records whose originating file had `file_digest`.
    #[cfg(test)]
    pub(crate) async fn count_for_digest(&self, file_digest: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM records WHERE collection = ? AND file_digest = ?",
        )
        .bind(&self.collection)
        .bind(file_digest)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
