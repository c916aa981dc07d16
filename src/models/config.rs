use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_GENERATOR_URL: &str = "http://localhost:11434";
pub const DEFAULT_POSTGRES_URL: &str = "postgres://localhost:5432/kbrag";
pub const DEFAULT_TABLE: &str = "kb_chunks";

/// Canonical embedding dimension shared by every store and provider.
/// Backends with a smaller native dimension are zero-padded up to this.
pub const CANONICAL_DIMENSION: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kbrag").join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()
    }
}

/// Embedding backends; the set is closed and resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// BGE-M3 multilingual model, native 1024 dimensions
    #[default]
    BgeM3,
    /// Nomic Embed Text, native 768 dimensions (zero-padded to 1024)
    NomicEmbed,
}

impl EmbeddingBackend {
    /// Dimension the model itself produces, before any padding.
    pub fn native_dimension(&self) -> usize {
        match self {
            EmbeddingBackend::BgeM3 => 1024,
            EmbeddingBackend::NomicEmbed => 768,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingBackend::BgeM3 => "bge-m3",
            EmbeddingBackend::NomicEmbed => "nomic-embed",
        }
    }
}

impl FromStr for EmbeddingBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bge-m3" | "bge_m3" => Ok(EmbeddingBackend::BgeM3),
            "nomic-embed" | "nomic" => Ok(EmbeddingBackend::NomicEmbed),
            other => Err(ConfigError::UnknownEmbeddingBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vector store backends; closed set, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// In-process flat index persisted as a paired snapshot
    #[default]
    Flat,
    /// PostgreSQL with the pgvector extension
    Pgvector,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Flat => "flat",
            StoreBackend::Pgvector => "pgvector",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(StoreBackend::Flat),
            "pgvector" | "postgres" => Ok(StoreBackend::Pgvector),
            other => Err(ConfigError::UnknownStoreBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Directory containing model.onnx and tokenizer.json for the backend.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_embed_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    512
}

impl EmbeddingConfig {
    /// Resolved model directory, falling back to the per-backend data dir.
    pub fn resolved_model_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.model_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|p| p.join("kbrag").join("models").join(self.backend.as_str()))
            .ok_or_else(|| ConfigError::PathError("could not determine data directory".to_string()))
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model_dir: None,
            timeout_secs: default_embed_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Flat backend: path of the vector index file. The metadata sidecar
    /// lives next to it.
    #[serde(default)]
    pub index_path: Option<PathBuf>,

    /// Pgvector backend: connection URL.
    #[serde(default = "default_postgres_url")]
    pub url: String,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_postgres_url() -> String {
    DEFAULT_POSTGRES_URL.to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_pool_max() -> u32 {
    5
}

fn default_pool_acquire_timeout() -> u32 {
    30
}

impl StoreConfig {
    pub fn resolved_index_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.index_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|p| p.join("kbrag").join("flat.index"))
            .ok_or_else(|| ConfigError::PathError("could not determine data directory".to_string()))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            index_path: None,
            url: default_postgres_url(),
            table: default_table(),
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in whitespace-delimited words.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Word overlap between successive windows; must stay below chunk_size.
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_url")]
    pub url: String,

    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

fn default_generator_url() -> String {
    DEFAULT_GENERATOR_URL.to_string()
}

fn default_generator_timeout() -> u64 {
    60
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: default_generator_url(),
            timeout_secs: default_generator_timeout(),
        }
    }
}
