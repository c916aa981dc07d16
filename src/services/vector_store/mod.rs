//! Vector store abstraction layer.
//!
//! A trait-based abstraction over the two persistence backends (in-process
//! flat index, PostgreSQL/pgvector) so the pipelines stay backend-agnostic.

mod flat;
mod pgvector;

pub use flat::FlatIndexStore;
pub use pgvector::RelationalStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, StoreError};
use crate::models::{ChunkMetadata, SearchHit, StoreBackend, StoreConfig, StoreStats};

/// Persistent similarity index over unit-normalized vectors.
///
/// Both backends report cosine-similarity scores, deduplicate on
/// `(source, chunk_index)`, and treat an upsert batch as all-or-nothing.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or update chunks. The three slices are parallel and must
    /// agree in length; every embedding must match the store dimension.
    /// Returns the number of chunks processed (inserted + updated).
    async fn upsert(
        &self,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadata: &[ChunkMetadata],
    ) -> Result<usize, StoreError>;

    /// Top-k nearest neighbors, strictly descending by score with ties
    /// broken by ascending id. `k` is clamped to the stored count.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Administrative wipe; never called by the pipelines.
    async fn clear(&self) -> Result<(), StoreError>;

    fn backend(&self) -> &'static str;
}

/// Create a vector store backend based on configuration.
pub async fn create_store(
    config: &StoreConfig,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>, AppError> {
    match config.backend {
        StoreBackend::Flat => {
            let path = config.resolved_index_path()?;
            Ok(Arc::new(FlatIndexStore::new(path, dimension)))
        }
        StoreBackend::Pgvector => {
            let store = RelationalStore::connect(config, dimension).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Shared upsert-entry validation for both backends.
pub(crate) fn validate_batch(
    texts: &[String],
    embeddings: &[Vec<f32>],
    metadata: &[ChunkMetadata],
    dimension: usize,
) -> Result<(), StoreError> {
    if texts.len() != embeddings.len() || texts.len() != metadata.len() {
        return Err(StoreError::BatchLengthMismatch {
            texts: texts.len(),
            embeddings: embeddings.len(),
            metadata: metadata.len(),
        });
    }
    for embedding in embeddings {
        if embedding.len() != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_batch_rejects_length_mismatch() {
        let texts = vec!["a".to_string()];
        let embeddings: Vec<Vec<f32>> = vec![];
        let metadata = vec![ChunkMetadata::new("s", 0, 1, 1)];
        assert!(matches!(
            validate_batch(&texts, &embeddings, &metadata, 4),
            Err(StoreError::BatchLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_batch_rejects_dimension_mismatch() {
        let texts = vec!["a".to_string()];
        let embeddings = vec![vec![1.0, 0.0, 0.0]];
        let metadata = vec![ChunkMetadata::new("s", 0, 1, 1)];
        assert!(matches!(
            validate_batch(&texts, &embeddings, &metadata, 4),
            Err(StoreError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_validate_batch_accepts_consistent_input() {
        let texts = vec!["a".to_string()];
        let embeddings = vec![vec![1.0, 0.0, 0.0, 0.0]];
        let metadata = vec![ChunkMetadata::new("s", 0, 1, 1)];
        assert!(validate_batch(&texts, &embeddings, &metadata, 4).is_ok());
    }
}
