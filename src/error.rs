//! Error types for the retrieval engine.

use thiserror::Error;

/// Errors related to configuration and backend selection.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("unknown embedding backend: {0}")]
    UnknownEmbeddingBackend(String),

    #[error("unknown store backend: {0}")]
    UnknownStoreBackend(String),

    #[error("invalid chunking parameters: overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    #[error("chunk size must be at least 1")]
    ZeroChunkSize,

    #[error(
        "embedding backend produces {native}-dimensional vectors, larger than the canonical {canonical}"
    )]
    DimensionExceedsCanonical { native: usize, canonical: usize },
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load embedding model: {0}")]
    ModelLoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),

    #[error("embedding timeout")]
    Timeout,
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("batch length mismatch: {texts} texts, {embeddings} embeddings, {metadata} metadata entries")]
    BatchLengthMismatch {
        texts: usize,
        embeddings: usize,
        metadata: usize,
    },

    #[error("snapshot persistence error: {0}")]
    Persistence(String),

    #[error("failed to connect to store: {0}")]
    ConnectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("unresolved unique-constraint conflict: {0}")]
    Conflict(String),

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),
}

/// Errors related to the external answer-generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to connect to generation server: {0}")]
    ConnectionError(String),

    #[error("generation server error: {0}")]
    ServerError(String),

    #[error("generation request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation timeout")]
    Timeout,
}

/// Errors related to ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no chunks produced from input")]
    EmptyInput,

    #[error("config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("encoding error: {0}")]
    EncodingError(#[from] EncodingError),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),
}

/// Errors related to query handling.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("encoding error: {0}")]
    EncodingError(#[from] EncodingError),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("generation error: {0}")]
    GenerationError(#[from] GenerationError),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("{0}")]
    Other(String),
}
