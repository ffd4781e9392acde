//! Shared application state

use std::sync::Arc;

use crate::config::DocChatConfig;
use crate::embedding::EmbedStage;
use crate::ingestion::IngestStage;
use crate::providers::{AnswerModel, Embedder, OllamaAnswerModel, OllamaClient, OllamaEmbedder};
use crate::query::QueryStage;
use crate::queue::{SqliteTaskQueue, TaskQueue};
use crate::registry::{DocumentRegistry, SqliteRegistry};
use crate::storage::{LocalObjectStore, ObjectStore};
use crate::error::Result;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DocChatConfig>,
    pub store: Arc<dyn ObjectStore>,
    pub registry: Arc<dyn DocumentRegistry>,
    pub queue: Arc<dyn TaskQueue>,
    pub ingest: Arc<IngestStage>,
    pub embed: Arc<EmbedStage>,
    pub query: Arc<QueryStage>,
}

impl AppState {
    /// Wire up the full production stack from configuration
    pub fn from_config(config: DocChatConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.storage.root)?);
        let registry: Arc<dyn DocumentRegistry> =
            Arc::new(SqliteRegistry::new(&config.registry.path)?);
        let queue: Arc<dyn TaskQueue> = Arc::new(SqliteTaskQueue::new(
            &config.queue.path,
            config.queue.visibility_timeout_secs,
        )?);

        let ollama = Arc::new(OllamaClient::new(
            &config.llm.base_url,
            std::time::Duration::from_secs(config.llm.timeout_secs),
        )?);
        let embedder: Arc<dyn Embedder> =
            Arc::new(OllamaEmbedder::new(ollama.clone(), &config.embeddings));
        let model: Arc<dyn AnswerModel> = Arc::new(OllamaAnswerModel::new(ollama, &config.llm));

        Ok(Self::assemble(config, store, registry, queue, embedder, model))
    }

    /// Wire up with explicit collaborators. Used by tests to substitute
    /// mock providers.
    pub fn assemble(
        config: DocChatConfig,
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn DocumentRegistry>,
        queue: Arc<dyn TaskQueue>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn AnswerModel>,
    ) -> Self {
        let ingest = Arc::new(IngestStage::new(
            store.clone(),
            registry.clone(),
            queue.clone(),
        ));
        let embed = Arc::new(EmbedStage::new(
            store.clone(),
            registry.clone(),
            embedder.clone(),
            &config.chunking,
            &config.embeddings,
        ));
        let query = Arc::new(QueryStage::new(
            store.clone(),
            registry.clone(),
            embedder,
            model,
            &config.query,
        ));
        Self {
            config: Arc::new(config),
            store,
            registry,
            queue,
            ingest,
            embed,
            query,
        }
    }
}
