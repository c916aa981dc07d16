//! Ingestion pipeline: text to stored, deduplicated chunks.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::info;

use crate::error::{EncodingError, IngestError};
use crate::models::{ChunkMetadata, IngestReport};
use crate::services::chunker::WordChunker;
use crate::services::embedding::EmbeddingProvider;
use crate::services::vector_store::VectorStore;

/// Binds chunker, provider, and store. Holds no state across calls;
/// independent ingests may run concurrently, bounded only by the store's
/// writer discipline.
pub struct IngestionPipeline {
    chunker: WordChunker,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    encode_deadline: Duration,
}

impl IngestionPipeline {
    pub fn new(
        chunker: WordChunker,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        encode_deadline: Duration,
    ) -> Self {
        Self {
            chunker,
            provider,
            store,
            encode_deadline,
        }
    }

    /// Chunk, embed in one batch, and upsert. An embedding failure aborts
    /// before anything reaches the store, and the store's own atomicity
    /// covers the rest of the batch.
    pub async fn ingest(&self, text: &str, source: &str) -> Result<IngestReport, IngestError> {
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return Err(IngestError::EmptyInput);
        }

        let embeddings = timeout(self.encode_deadline, self.provider.encode(&chunks))
            .await
            .map_err(|_| EncodingError::Timeout)??;

        let total_chunks = chunks.len() as u32;
        let metadata: Vec<ChunkMetadata> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                ChunkMetadata::new(source, i as u32, total_chunks, chunk.chars().count())
            })
            .collect();

        let ingested = self.store.upsert(&chunks, &embeddings, &metadata).await?;

        info!(source, chunks = chunks.len(), ingested, "ingested document");

        Ok(IngestReport {
            ingested,
            chunks: chunks.len(),
            characters: text.chars().count(),
            source: source.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{SearchHit, StoreStats};
    use crate::services::vector_store::FlatIndexStore;
    use async_trait::async_trait;

    /// Deterministic stand-in provider: hashes each text into a tiny vector.
    struct StubProvider {
        dimension: usize,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError> {
            if self.fail {
                return Err(EncodingError::InferenceError("stub failure".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.dimension];
                    for (i, b) in t.bytes().enumerate() {
                        v[i % self.dimension] += b as f32;
                    }
                    v
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn identifier(&self) -> &str {
            "stub"
        }
    }

    /// Store that records nothing and rejects everything.
    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn upsert(
            &self,
            _texts: &[String],
            _embeddings: &[Vec<f32>],
            _metadata: &[ChunkMetadata],
        ) -> Result<usize, StoreError> {
            panic!("store must not be reached after an embedding failure");
        }

        async fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<SearchHit>, StoreError> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> Result<StoreStats, StoreError> {
            Ok(StoreStats {
                total_vectors: 0,
                dimension: 4,
                backend: "failing".to_string(),
            })
        }

        async fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    fn pipeline(dir: &std::path::Path, fail_encode: bool) -> IngestionPipeline {
        IngestionPipeline::new(
            WordChunker::from_params(4, 1).unwrap(),
            Arc::new(StubProvider {
                dimension: 4,
                fail: fail_encode,
            }),
            Arc::new(FlatIndexStore::new(dir.join("flat.index"), 4)),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_whitespace_only_input_is_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = pipeline(dir.path(), false).ingest("   ", "x").await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyInput));
    }

    #[tokio::test]
    async fn test_ingest_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let text = "one two three four five six seven";
        let report = pipeline(dir.path(), false).ingest(text, "doc").await.unwrap();

        // 7 words, window 4, stride 3: [0..4], [3..7], [6..7]
        assert_eq!(report.chunks, 3);
        assert_eq!(report.ingested, 3);
        assert_eq!(report.characters, text.chars().count());
        assert_eq!(report.source, "doc");
    }

    #[tokio::test]
    async fn test_reingest_same_source_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> =
            Arc::new(FlatIndexStore::new(dir.path().join("flat.index"), 4));
        let pipeline = IngestionPipeline::new(
            WordChunker::from_params(100, 10).unwrap(),
            Arc::new(StubProvider {
                dimension: 4,
                fail: false,
            }),
            store.clone(),
            Duration::from_secs(5),
        );

        pipeline.ingest("first text", "doc").await.unwrap();
        let before = store.stats().await.unwrap().total_vectors;

        pipeline.ingest("entirely different words", "doc").await.unwrap();
        let after = store.stats().await.unwrap().total_vectors;

        assert_eq!(before, after);
    }

    /// Provider that never answers within any reasonable deadline.
    struct StalledProvider;

    #[async_trait]
    impl EmbeddingProvider for StalledProvider {
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn identifier(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_encode_deadline_surfaces_timeout() {
        let pipeline = IngestionPipeline::new(
            WordChunker::from_params(4, 1).unwrap(),
            Arc::new(StalledProvider),
            Arc::new(FailingStore),
            Duration::from_millis(20),
        );

        let err = pipeline.ingest("some words here", "doc").await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::EncodingError(EncodingError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_before_store() {
        let pipeline = IngestionPipeline::new(
            WordChunker::from_params(4, 1).unwrap(),
            Arc::new(StubProvider {
                dimension: 4,
                fail: true,
            }),
            Arc::new(FailingStore),
            Duration::from_secs(5),
        );

        let err = pipeline.ingest("some words here", "doc").await.unwrap_err();
        assert!(matches!(err, IngestError::EncodingError(_)));
    }
}
