use serde::{Deserialize, Serialize};

/// Per-chunk metadata built by the ingestion pipeline and stored alongside
/// the embedding. `(source, chunk_index)` is the dedup key: at most one live
/// chunk exists per key, and re-ingestion replaces it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Chunk length in characters.
    pub chunk_size: usize,

    #[serde(flatten, default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>, chunk_index: u32, total_chunks: u32, chunk_size: usize) -> Self {
        Self {
            source: source.into(),
            chunk_index,
            total_chunks,
            chunk_size,
            extra: serde_json::Map::new(),
        }
    }

    /// The dedup key identifying this chunk within its store.
    pub fn key(&self) -> (&str, u32) {
        (&self.source, self.chunk_index)
    }
}

/// A stored chunk as the flat backend persists it in the metadata sidecar.
/// Records are kept index-aligned with the vector block by insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Store-assigned id, monotonically increasing in insertion order.
    pub id: i64,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub created_at: String,
}

/// A single search hit, ordered by descending score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub content: String,
    pub source: String,
    pub chunk_index: u32,
    pub metadata: serde_json::Value,
    /// Cosine similarity of the stored vector against the query.
    pub score: f32,
}

/// Store statistics reported by both backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_vectors: u64,
    pub dimension: usize,
    pub backend: String,
}
