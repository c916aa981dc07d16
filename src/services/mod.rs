mod chunker;
mod embedding;
mod generator;
mod ingest;
mod query;
mod vector_store;

pub use chunker::WordChunker;
pub use embedding::{EmbeddingProvider, OnnxEmbeddingProvider, create_provider};
pub use generator::{AnswerGenerator, HttpGenerator};
pub use ingest::IngestionPipeline;
pub use query::{CONTEXT_PREVIEW_BUDGET, CONTEXT_SEPARATOR, QueryPipeline};
pub use vector_store::{FlatIndexStore, RelationalStore, VectorStore, create_store};
