//! Pipeline results returned to the routing layer.

use serde::{Deserialize, Serialize};

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Chunks processed by the store (inserted + updated).
    pub ingested: usize,
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Characters in the raw input.
    pub characters: usize,
    pub source: String,
}

/// A ranked context reference returned with an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub content: String,
    pub source: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// Outcome of one query call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The external generator's answer, verbatim.
    pub answer: String,
    /// References in store-returned (ranked) order.
    pub references: Vec<Reference>,
    /// Display preview of the assembled context, character-budget bounded.
    pub context_preview: String,
    pub generator_used: String,
}
