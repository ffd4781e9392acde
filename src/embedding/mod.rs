//! Embedding stage: task to indexed, READY document

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{ChunkingConfig, EmbeddingsConfig};
use crate::error::{Error, Result};
use crate::index::{artifact_keys, SimilarityIndex};
use crate::ingestion::{PdfParser, TextChunker};
use crate::providers::Embedder;
use crate::registry::DocumentRegistry;
use crate::storage::ObjectStore;
use crate::types::document::{DocumentRecord, DocumentStatus};
use crate::types::task::EmbedTask;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Consumes embedding tasks: downloads the PDF, chunks it, embeds every
/// chunk, writes the index artifacts, and drives the document's status
/// to READY or FAILED.
///
/// Safe under task redelivery: claiming re-enters PROCESSING, artifact
/// writes are idempotent, and a task for an already terminal document is
/// rejected by the registry before any work happens.
pub struct EmbedStage {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn DocumentRegistry>,
    embedder: Arc<dyn Embedder>,
    chunker: TextChunker,
    parallel: usize,
    embed_timeout: Duration,
}

impl EmbedStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn DocumentRegistry>,
        embedder: Arc<dyn Embedder>,
        chunking: &ChunkingConfig,
        embeddings: &EmbeddingsConfig,
    ) -> Self {
        Self {
            store,
            registry,
            embedder,
            chunker: TextChunker::from_config(chunking),
            parallel: embeddings.parallel.max(1),
            embed_timeout: Duration::from_secs(embeddings.timeout_secs),
        }
    }

    pub async fn handle_task(&self, task: &EmbedTask) -> Result<DocumentRecord> {
        let key = task.document_key();
        let record = self
            .registry
            .transition(&key, DocumentStatus::Processing, None)
            .await?;
        let filename = record.filename.clone();
        info!("[{filename}] processing document {}", task.document_id);

        match self.build_index(task, &filename).await {
            Ok(chunk_count) => {
                let record = self
                    .registry
                    .transition(&key, DocumentStatus::Ready, None)
                    .await?;
                info!("[{filename}] ready, {chunk_count} chunks indexed");
                Ok(record)
            }
            Err(e) if e.is_retryable() => {
                // leave the record in PROCESSING so a redelivered task
                // can try again
                warn!("[{filename}] transient failure, awaiting redelivery: {e}");
                Err(e)
            }
            Err(e) => {
                error!("[{filename}] processing failed: {e}");
                let cause = e.to_string();
                if let Err(mark) = self
                    .registry
                    .transition(&key, DocumentStatus::Failed, Some(&cause))
                    .await
                {
                    warn!("[{filename}] could not record failure: {mark}");
                }
                Err(e)
            }
        }
    }

    async fn build_index(&self, task: &EmbedTask, filename: &str) -> Result<usize> {
        let data = tokio::time::timeout(DOWNLOAD_TIMEOUT, self.store.get(&task.key))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("download '{}'", task.key),
                secs: DOWNLOAD_TIMEOUT.as_secs(),
            })??;

        let parsed = PdfParser::parse(filename, &data)?;
        let chunks = self.chunker.chunk_document(&task.document_id, &parsed);
        if chunks.is_empty() {
            return Err(Error::EmptyDocument(filename.to_string()));
        }
        info!(
            "[{filename}] {} chunks from {} pages",
            chunks.len(),
            parsed.page_count
        );

        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let futures = chunks.iter().map(|chunk| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| Error::Embedding("embedding pool closed".to_string()))?;
                self.embed_chunk(&chunk.content).await
            }
        });
        let mut embeddings = Vec::with_capacity(chunks.len());
        for result in join_all(futures).await {
            embeddings.push(result?);
        }

        let index = SimilarityIndex::build(
            &task.key,
            self.embedder.model(),
            self.embedder.dimensions(),
            chunks,
            embeddings,
        )?;

        let (vec_bytes, meta_bytes) = index.to_artifacts()?;
        let (vec_key, meta_key) = artifact_keys(filename);
        self.store.put(&vec_key, &vec_bytes).await?;
        self.store.put(&meta_key, &meta_bytes).await?;
        Ok(index.len())
    }

    async fn embed_chunk(&self, content: &str) -> Result<Vec<f32>> {
        tokio::time::timeout(self.embed_timeout, self.embedder.embed(content))
            .await
            .map_err(|_| Error::Timeout {
                operation: "embed chunk".to_string(),
                secs: self.embed_timeout.as_secs(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockEmbedder;
    use crate::queue::SqliteTaskQueue;
    use crate::registry::SqliteRegistry;
    use crate::storage::{LocalObjectStore, StorageEvent};
    use crate::test_support::minimal_pdf;
    use crate::types::document::DocumentKey;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<LocalObjectStore>,
        registry: Arc<SqliteRegistry>,
        stage: EmbedStage,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalObjectStore::new(dir.path()).unwrap());
        let registry = Arc::new(SqliteRegistry::in_memory().unwrap());
        let stage = EmbedStage::new(
            store.clone(),
            registry.clone(),
            Arc::new(MockEmbedder::new(64)),
            &ChunkingConfig::default(),
            &EmbeddingsConfig {
                dimensions: 64,
                ..Default::default()
            },
        );
        Fixture {
            _dir: dir,
            store,
            registry,
            stage,
        }
    }

    async fn ingest(fx: &Fixture, filename: &str, pages: &[&str]) -> EmbedTask {
        let pdf = minimal_pdf(pages);
        fx.store.put(filename, &pdf).await.unwrap();
        let ingest = crate::ingestion::IngestStage::new(
            fx.store.clone(),
            fx.registry.clone(),
            Arc::new(SqliteTaskQueue::in_memory(60).unwrap()),
        );
        let outcome = ingest
            .handle_event(&StorageEvent::new(filename, pdf.len() as u64))
            .await
            .unwrap();
        EmbedTask::for_record(outcome.record(), filename)
    }

    #[tokio::test]
    async fn test_task_produces_ready_document_with_artifacts() {
        let fx = fixture();
        let task = ingest(&fx, "notes.pdf", &["The project deadline is in March."]).await;

        let record = fx.stage.handle_task(&task).await.unwrap();
        assert_eq!(record.docstatus, DocumentStatus::Ready);

        let (vec_key, meta_key) = artifact_keys("notes.pdf");
        let vec_bytes = fx.store.get(&vec_key).await.unwrap();
        let meta_bytes = fx.store.get(&meta_key).await.unwrap();
        let index = SimilarityIndex::from_artifacts(&vec_bytes, &meta_bytes).unwrap();
        assert!(!index.is_empty());
        assert_eq!(index.source_key(), "notes.pdf");
    }

    #[tokio::test]
    async fn test_redelivered_task_is_idempotent() {
        let fx = fixture();
        let task = ingest(&fx, "again.pdf", &["Some stable page content here."]).await;

        fx.stage.handle_task(&task).await.unwrap();
        let (vec_key, _) = artifact_keys("again.pdf");
        let first = fx.store.get(&vec_key).await.unwrap();

        // second delivery hits the terminal READY record and is rejected
        // before touching artifacts
        let err = fx.stage.handle_task(&task).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        let second = fx.store.get(&vec_key).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_object_marks_failed() {
        let fx = fixture();
        let task = ingest(&fx, "gone.pdf", &["Page text."]).await;

        // object disappears between ingestion and embedding
        std::fs::remove_file(fx._dir.path().join("gone.pdf")).unwrap();

        let err = fx.stage.handle_task(&task).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_) | Error::Storage(_)));

        // NotFound from storage is treated as permanent
        let record = fx
            .registry
            .get(&DocumentKey::new(&task.document_id, &task.created))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.docstatus, DocumentStatus::Failed);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn test_unknown_document_rejected() {
        let fx = fixture();
        let task = EmbedTask {
            document_id: "missing".into(),
            created: "2024-01-01T00:00:00.000000Z".into(),
            key: "missing.pdf".into(),
        };
        let err = fx.stage.handle_task(&task).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
