//! Configuration loading and defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration for the document chat service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocChatConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum upload size in bytes
    #[serde(default = "default_max_upload")]
    pub max_upload_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for uploaded PDFs and index artifacts
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// SQLite database holding document records
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// SQLite database backing the task queue
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
    /// How long a claimed task stays invisible before redelivery
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
    /// Worker poll interval when the queue is empty
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embed_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// How many chunks to embed concurrently
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_generate_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generate_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Whether prior conversation turns are included in the prompt
    #[serde(default = "default_include_history")]
    pub include_history: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8600
}
fn default_max_upload() -> usize {
    50 * 1024 * 1024
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/objects")
}
fn default_registry_path() -> PathBuf {
    PathBuf::from("./data/registry.db")
}
fn default_queue_path() -> PathBuf {
    PathBuf::from("./data/queue.db")
}
fn default_visibility_timeout() -> u64 {
    120
}
fn default_poll_interval() -> u64 {
    500
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_min_chunk_size() -> usize {
    50
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_dimensions() -> usize {
    768
}
fn default_parallel() -> usize {
    4
}
fn default_embed_timeout() -> u64 {
    30
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_generate_model() -> String {
    "llama3.2".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_generate_timeout() -> u64 {
    120
}
fn default_top_k() -> usize {
    5
}
fn default_include_history() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size: default_max_upload(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            visibility_timeout_secs: default_visibility_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embed_model(),
            dimensions: default_dimensions(),
            parallel: default_parallel(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_generate_model(),
            temperature: default_temperature(),
            timeout_secs: default_generate_timeout(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            include_history: default_include_history(),
        }
    }
}

impl DocChatConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Apply `DOCCHAT_*` environment overrides on top of file values
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("DOCCHAT_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("DOCCHAT_PORT") {
            self.server.port = v
                .parse()
                .map_err(|e| Error::Config(format!("DOCCHAT_PORT: {e}")))?;
        }
        if let Ok(v) = std::env::var("DOCCHAT_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCCHAT_REGISTRY_PATH") {
            self.registry.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCCHAT_QUEUE_PATH") {
            self.queue.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCCHAT_OLLAMA_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCCHAT_EMBED_MODEL") {
            self.embeddings.model = v;
        }
        if let Ok(v) = std::env::var("DOCCHAT_LLM_MODEL") {
            self.llm.model = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(
                "chunking.chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be > 0".into()));
        }
        if self.embeddings.parallel == 0 {
            return Err(Error::Config("embeddings.parallel must be > 0".into()));
        }
        if self.query.top_k == 0 {
            return Err(Error::Config("query.top_k must be > 0".into()));
        }
        Ok(())
    }
}
