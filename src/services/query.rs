//! Query pipeline: ranked retrieval, context assembly, and delegation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::info;

use crate::error::{EncodingError, GenerationError, QueryError};
use crate::models::{QueryResponse, Reference};
use crate::services::embedding::EmbeddingProvider;
use crate::services::generator::AnswerGenerator;
use crate::services::vector_store::VectorStore;

/// Separator between context blocks.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Character budget for the display preview of the context.
pub const CONTEXT_PREVIEW_BUDGET: usize = 500;

/// Stateless pipeline: embed the query, search, assemble context, delegate
/// to the answer generator. Pure data assembly; never fabricates an answer.
pub struct QueryPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn AnswerGenerator>,
    encode_deadline: Duration,
    generate_deadline: Duration,
}

impl QueryPipeline {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn AnswerGenerator>,
        encode_deadline: Duration,
        generate_deadline: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            generator,
            encode_deadline,
            generate_deadline,
        }
    }

    pub async fn query(
        &self,
        text: &str,
        k: usize,
        route_hint: Option<&str>,
    ) -> Result<QueryResponse, QueryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::InvalidQuery("query cannot be empty".to_string()));
        }

        let query_batch = [text.to_string()];
        let embeddings = timeout(self.encode_deadline, self.provider.encode(&query_batch))
            .await
            .map_err(|_| EncodingError::Timeout)??;

        let query_embedding = embeddings.into_iter().next().ok_or_else(|| {
            EncodingError::InferenceError("empty embedding batch for query".to_string())
        })?;

        let hits = self.store.search(&query_embedding, k).await?;

        // References preserve store-returned (ranked) order.
        let references: Vec<Reference> = hits
            .iter()
            .map(|hit| Reference {
                content: hit.content.clone(),
                source: hit.source.clone(),
                score: hit.score,
                metadata: hit.metadata.clone(),
            })
            .collect();

        let context = hits
            .iter()
            .map(|hit| format!("Source: {}\n{}", hit.source, hit.content))
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let answer = timeout(
            self.generate_deadline,
            self.generator.generate(text, &context, route_hint),
        )
        .await
        .map_err(|_| GenerationError::Timeout)??;

        info!(k, hits = references.len(), "answered query");

        Ok(QueryResponse {
            answer,
            references,
            context_preview: crate::utils::truncate_preview(&context, CONTEXT_PREVIEW_BUDGET),
            generator_used: self.generator.identifier().to_string(),
        })
    }
}
