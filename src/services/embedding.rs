//! Embedding providers: text in, fixed-dimension unit vectors out.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{ConfigError, EncodingError};
use crate::models::{CANONICAL_DIMENSION, EmbeddingConfig};
use crate::utils::{l2_normalize, pad_to};

/// Turns batches of text into vectors of the canonical dimension.
///
/// `encode` preserves input order and is deterministic for a fixed model
/// version. Providers never retry internally; retries and deadlines are the
/// caller's policy.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError>;

    /// Output dimension, invariant for the provider's lifetime.
    fn dimension(&self) -> usize;

    fn identifier(&self) -> &str;
}

/// ONNX-backed provider. The model is loaded at most once, on first use;
/// concurrent first calls share a single load behind the cell.
pub struct OnnxEmbeddingProvider {
    model_dir: PathBuf,
    max_tokens: usize,
    native_dimension: usize,
    identifier: &'static str,
    model: OnceCell<OnnxEncoder>,
}

impl OnnxEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let native = config.backend.native_dimension();
        if native > CANONICAL_DIMENSION {
            return Err(ConfigError::DimensionExceedsCanonical {
                native,
                canonical: CANONICAL_DIMENSION,
            });
        }

        Ok(Self {
            model_dir: config.resolved_model_dir()?,
            max_tokens: config.max_tokens as usize,
            native_dimension: native,
            identifier: config.backend.as_str(),
            model: OnceCell::new(),
        })
    }

    async fn encoder(&self) -> Result<&OnnxEncoder, EncodingError> {
        self.model
            .get_or_try_init(|| async {
                info!(backend = self.identifier, dir = %self.model_dir.display(), "loading embedding model");
                OnnxEncoder::load(&self.model_dir, self.max_tokens, self.native_dimension)
            })
            .await
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbeddingProvider {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encoder = self.encoder().await?;
        let native = encoder.embed(texts)?;

        // Normalize at the native dimension, then zero-pad on the high end;
        // padding with zeros preserves the unit norm.
        Ok(native
            .into_iter()
            .map(|v| pad_to(l2_normalize(&v), CANONICAL_DIMENSION))
            .collect())
    }

    fn dimension(&self) -> usize {
        CANONICAL_DIMENSION
    }

    fn identifier(&self) -> &str {
        self.identifier
    }
}

/// Create the provider for the configured backend. Both members of the
/// closed set run through the ONNX encoder, parameterized by the backend's
/// model directory and native dimension.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<std::sync::Arc<dyn EmbeddingProvider>, ConfigError> {
    Ok(std::sync::Arc::new(OnnxEmbeddingProvider::new(config)?))
}

/// ONNX session plus tokenizer for one embedding model.
struct OnnxEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl OnnxEncoder {
    fn load(model_dir: &Path, max_tokens: usize, dimension: usize) -> Result<Self, EncodingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(EncodingError::ModelNotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| EncodingError::ModelLoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EncodingError::ModelLoadError(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e| EncodingError::ModelLoadError(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e| EncodingError::ModelLoadError(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EncodingError::TokenizerError(e.to_string()))?;

        // Truncate long texts to keep memory bounded
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EncodingError::TokenizerError(e.to_string()))?;

        // Pad within the batch so one run covers all inputs
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension,
        })
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncodingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EncodingError::TokenizerError(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = m as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e| EncodingError::InferenceError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array(([batch_size, max_len], attention_mask))
            .map_err(|e| EncodingError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EncodingError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_ids_tensor, attention_mask_tensor])
            .map_err(|e| EncodingError::InferenceError(e.to_string()))?;

        let output_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| EncodingError::InferenceError(e.to_string()))?;

        let shape = output_array.shape();

        let embeddings: Vec<Vec<f32>> = if shape.len() == 3 {
            // Token-level output: mean-pool over the attended positions
            (0..batch_size)
                .map(|i| {
                    let mask = encodings[i].get_attention_mask();
                    let attended = mask.iter().filter(|&&m| m == 1).count().max(1);
                    (0..self.dimension)
                        .map(|d| {
                            let sum: f32 = (0..mask.len())
                                .filter(|&j| mask[j] == 1)
                                .map(|j| output_array[[i, j, d]])
                                .sum();
                            sum / attended as f32
                        })
                        .collect()
                })
                .collect()
        } else if shape.len() == 2 {
            (0..batch_size)
                .map(|i| (0..self.dimension).map(|d| output_array[[i, d]]).collect())
                .collect()
        } else {
            return Err(EncodingError::InferenceError(format!(
                "unexpected output shape: {:?}",
                shape
            )));
        };

        Ok(embeddings)
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
