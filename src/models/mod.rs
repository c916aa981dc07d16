mod chunk;
mod config;
mod report;

pub use chunk::{ChunkMetadata, ChunkRecord, SearchHit, StoreStats};
pub use config::{
    CANONICAL_DIMENSION, ChunkingConfig, Config, DEFAULT_GENERATOR_URL, DEFAULT_POSTGRES_URL,
    DEFAULT_TABLE, EmbeddingBackend, EmbeddingConfig, GeneratorConfig, StoreBackend, StoreConfig,
};
pub use report::{IngestReport, QueryResponse, Reference};
