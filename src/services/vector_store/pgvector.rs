//! PostgreSQL/pgvector backend.
//!
//! Dedup correctness lives in the engine: a `UNIQUE (source, chunk_index)`
//! constraint plus a single `INSERT .. ON CONFLICT DO UPDATE` statement per
//! chunk, never a read-then-write sequence. The whole batch runs in one
//! transaction so a failure partway leaves nothing behind.

use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use super::{VectorStore, validate_batch};
use crate::error::StoreError;
use crate::models::{ChunkMetadata, SearchHit, StoreConfig, StoreStats};
use crate::utils::l2_normalize;

pub const PGVECTOR_BACKEND: &str = "pgvector";

const UNIQUE_VIOLATION: &str = "23505";

pub struct RelationalStore {
    pool: PgPool,
    table: String,
    dimension: usize,
}

impl RelationalStore {
    /// Connect with a fresh pool and prepare the schema.
    pub async fn connect(config: &StoreConfig, dimension: usize) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        Self::with_pool(pool, config.table.clone(), dimension).await
    }

    /// Build on an externally supplied pool (the routing layer owns it).
    pub async fn with_pool(
        pool: PgPool,
        table: String,
        dimension: usize,
    ) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            table,
            dimension,
        };
        store.check_pgvector_extension().await?;
        store.ensure_table().await?;
        Ok(store)
    }

    async fn check_pgvector_extension(&self) -> Result<(), StoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        if result.is_none() {
            return Err(StoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                chunk_size INTEGER NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                embedding vector({}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (source, chunk_index)
            )
            "#,
            self.table, self.dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let index_sql = format!(
            "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding vector_cosine_ops)",
            self.table, self.table
        );
        sqlx::query(&index_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        Ok(())
    }

    fn upsert_sql(table: &str) -> String {
        format!(
            r#"
            INSERT INTO {table} (content, source, chunk_index, total_chunks, chunk_size, metadata, embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source, chunk_index) DO UPDATE SET
                content = EXCLUDED.content,
                total_chunks = EXCLUDED.total_chunks,
                chunk_size = EXCLUDED.chunk_size,
                metadata = EXCLUDED.metadata,
                embedding = EXCLUDED.embedding
            "#
        )
    }

    fn search_sql(table: &str, k: usize) -> String {
        format!(
            r#"
            SELECT
                id,
                content,
                source,
                chunk_index,
                metadata,
                1 - (embedding <=> $1) as score
            FROM {table}
            ORDER BY embedding <=> $1, id
            LIMIT {k}
            "#
        )
    }

    fn map_upsert_error(e: sqlx::Error) -> StoreError {
        if let Some(db) = e.as_database_error()
            && db.code().as_deref() == Some(UNIQUE_VIOLATION)
        {
            // ON CONFLICT should have absorbed this; reaching here means
            // the constraint the statement targets is missing or renamed.
            return StoreError::Conflict(db.to_string());
        }
        StoreError::UpsertError(e.to_string())
    }
}

#[async_trait]
impl VectorStore for RelationalStore {
    async fn upsert(
        &self,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadata: &[ChunkMetadata],
    ) -> Result<usize, StoreError> {
        validate_batch(texts, embeddings, metadata, self.dimension)?;
        if texts.is_empty() {
            return Ok(0);
        }

        let sql = Self::upsert_sql(&self.table);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;

        for ((text, embedding), meta) in texts.iter().zip(embeddings).zip(metadata) {
            let normalized = Vector::from(l2_normalize(embedding));
            let metadata_json = serde_json::to_value(meta)
                .map_err(|e| StoreError::UpsertError(e.to_string()))?;

            sqlx::query(&sql)
                .bind(text)
                .bind(&meta.source)
                .bind(meta.chunk_index as i32)
                .bind(meta.total_chunks as i32)
                .bind(meta.chunk_size as i32)
                .bind(&metadata_json)
                .bind(&normalized)
                .execute(&mut *tx)
                .await
                .map_err(Self::map_upsert_error)?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;

        Ok(texts.len())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let embedding = Vector::from(l2_normalize(query));
        let sql = Self::search_sql(&self.table, k);

        // One similarity-ordered query under a read transaction at the
        // engine's default isolation level.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::SearchError(e.to_string()))?;

        let rows = sqlx::query(&sql)
            .bind(&embedding)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StoreError::SearchError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::SearchError(e.to_string()))?;

        let hits = rows
            .into_iter()
            .map(|row: PgRow| {
                let id: i64 = row.get("id");
                let content: String = row.get("content");
                let source: String = row.get("source");
                let chunk_index: i32 = row.get("chunk_index");
                let metadata: serde_json::Value = row.get("metadata");
                let score: f64 = row.get("score");

                SearchHit {
                    id,
                    content,
                    source,
                    chunk_index: chunk_index as u32,
                    metadata,
                    score: score as f32,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let sql = format!("SELECT COUNT(*) as count FROM {}", self.table);
        let row: (i64,) = sqlx::query_as(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::SearchError(e.to_string()))?;

        Ok(StoreStats {
            total_vectors: row.0 as u64,
            dimension: self.dimension,
            backend: PGVECTOR_BACKEND.to_string(),
        })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let sql = format!("TRUNCATE TABLE {}", self.table);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        PGVECTOR_BACKEND
    }
}
