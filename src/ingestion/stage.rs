//! Ingestion stage: storage event to document record plus embedding task

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ingestion::pdf::PdfParser;
use crate::queue::TaskQueue;
use crate::registry::DocumentRegistry;
use crate::storage::{canonical_filename, ObjectStore, StorageEvent};
use crate::types::document::{
    derive_document_id, format_created, DocumentRecord, DocumentStatus,
};
use crate::types::task::EmbedTask;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// What handling a storage event did
#[derive(Debug)]
pub enum IngestOutcome {
    /// A new record was registered and a task enqueued
    Created(DocumentRecord),
    /// The bytes were already known and past the upload state; nothing
    /// to do
    Converged(DocumentRecord),
    /// The bytes were already known but still awaiting embedding; the
    /// task was enqueued again
    Requeued(DocumentRecord),
}

impl IngestOutcome {
    pub fn record(&self) -> &DocumentRecord {
        match self {
            IngestOutcome::Created(r)
            | IngestOutcome::Converged(r)
            | IngestOutcome::Requeued(r) => r,
        }
    }
}

/// Turns "object landed in storage" events into tracked documents.
///
/// The document id derives from the object bytes, so replaying the same
/// event (or re-uploading identical bytes) converges instead of creating
/// duplicate records.
pub struct IngestStage {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn DocumentRegistry>,
    queue: Arc<dyn TaskQueue>,
}

impl IngestStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn DocumentRegistry>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
        }
    }

    pub async fn handle_event(&self, event: &StorageEvent) -> Result<IngestOutcome> {
        let key = event.decoded_key()?;
        let filename = canonical_filename(&key)?.to_string();
        info!("[{filename}] storage event for key '{key}' ({} bytes)", event.size);

        let data = tokio::time::timeout(DOWNLOAD_TIMEOUT, self.store.get(&key))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("download '{key}'"),
                secs: DOWNLOAD_TIMEOUT.as_secs(),
            })??;

        let document_id = derive_document_id(&data);

        // identical bytes under the same filename converge on the
        // existing record; the same bytes under another filename get
        // their own record so artifacts land under their own prefix
        if let Some(existing) = self.registry.find_by_filename(&filename).await? {
            if existing.document_id == document_id {
                match existing.docstatus {
                    DocumentStatus::Uploaded => {
                        warn!(
                            "[{filename}] duplicate event for {document_id}, re-enqueueing task"
                        );
                        let task = EmbedTask::for_record(&existing, key);
                        self.queue.send(&task).await?;
                        return Ok(IngestOutcome::Requeued(existing));
                    }
                    DocumentStatus::Processing | DocumentStatus::Ready => {
                        info!(
                            "[{filename}] duplicate event for {document_id} (status {}), ignoring",
                            existing.docstatus
                        );
                        return Ok(IngestOutcome::Converged(existing));
                    }
                    // FAILED is terminal per record, not per content:
                    // re-uploading starts over with a fresh record
                    DocumentStatus::Failed => {
                        warn!(
                            "[{filename}] previous attempt failed ({}), re-ingesting",
                            existing.error.as_deref().unwrap_or("unknown cause")
                        );
                    }
                }
            } else {
                info!(
                    "[{filename}] new content {document_id} replaces {}, registering fresh record",
                    existing.document_id
                );
            }
        }

        // page count is recorded at ingestion so listings can show it
        // before the index exists
        let parsed = PdfParser::parse(&filename, &data)?;

        let record = DocumentRecord::new(
            document_id,
            format_created(Utc::now()),
            filename.clone(),
            parsed.page_count,
            event.size,
        );
        self.registry.put(&record).await?;

        let task = EmbedTask::for_record(&record, key);
        self.queue.send(&task).await?;

        info!(
            "[{filename}] registered {} ({} pages), task enqueued",
            record.document_id, record.pages
        );
        Ok(IngestOutcome::Created(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SqliteTaskQueue;
    use crate::registry::SqliteRegistry;
    use crate::storage::LocalObjectStore;
    use crate::test_support::minimal_pdf;
    use tempfile::TempDir;

    async fn stage(dir: &TempDir) -> (IngestStage, Arc<SqliteTaskQueue>, Arc<SqliteRegistry>) {
        let store = Arc::new(LocalObjectStore::new(dir.path()).unwrap());
        let registry = Arc::new(SqliteRegistry::in_memory().unwrap());
        let queue = Arc::new(SqliteTaskQueue::in_memory(60).unwrap());
        (
            IngestStage::new(store, registry.clone(), queue.clone()),
            queue,
            registry,
        )
    }

    #[tokio::test]
    async fn test_event_creates_record_and_task() {
        let dir = TempDir::new().unwrap();
        let (stage, queue, registry) = stage(&dir).await;

        let pdf = minimal_pdf(&["Hello world from page one."]);
        let store = LocalObjectStore::new(dir.path()).unwrap();
        store.put("hello.pdf", &pdf).await.unwrap();

        let outcome = stage
            .handle_event(&StorageEvent::new("hello.pdf", pdf.len() as u64))
            .await
            .unwrap();

        let record = outcome.record();
        assert_eq!(record.filename, "hello.pdf");
        assert_eq!(record.pages, "1");
        assert_eq!(record.filesize, pdf.len().to_string());
        assert_eq!(record.docstatus, DocumentStatus::Uploaded);
        assert!(matches!(outcome, IngestOutcome::Created(_)));

        assert_eq!(queue.depth().await.unwrap(), 1);
        let lease = queue.receive().await.unwrap().unwrap();
        assert_eq!(lease.task.document_id, record.document_id);
        assert_eq!(lease.task.key, "hello.pdf");

        assert!(registry
            .find_by_filename("hello.pdf")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_duplicate_event_converges() {
        let dir = TempDir::new().unwrap();
        let (stage, queue, _registry) = stage(&dir).await;

        let pdf = minimal_pdf(&["Same bytes both times."]);
        let store = LocalObjectStore::new(dir.path()).unwrap();
        store.put("dup.pdf", &pdf).await.unwrap();

        let event = StorageEvent::new("dup.pdf", pdf.len() as u64);
        let first = stage.handle_event(&event).await.unwrap();
        let second = stage.handle_event(&event).await.unwrap();

        // still UPLOADED, so the duplicate re-enqueues instead of forking
        assert!(matches!(second, IngestOutcome::Requeued(_)));
        assert_eq!(
            first.record().document_id,
            second.record().document_id
        );
        assert_eq!(queue.depth().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_record_reingested_on_reupload() {
        let dir = TempDir::new().unwrap();
        let (stage, queue, registry) = stage(&dir).await;

        let pdf = minimal_pdf(&["Recoverable content."]);
        let store = LocalObjectStore::new(dir.path()).unwrap();
        store.put("retry.pdf", &pdf).await.unwrap();

        let event = StorageEvent::new("retry.pdf", pdf.len() as u64);
        let first = stage.handle_event(&event).await.unwrap();
        registry
            .transition(&first.record().key(), DocumentStatus::Processing, None)
            .await
            .unwrap();
        registry
            .transition(
                &first.record().key(),
                DocumentStatus::Failed,
                Some("object vanished"),
            )
            .await
            .unwrap();

        // re-uploading the same bytes starts a fresh attempt
        let second = stage.handle_event(&event).await.unwrap();
        assert!(matches!(second, IngestOutcome::Created(_)));
        assert_eq!(
            second.record().document_id,
            first.record().document_id
        );
        assert_ne!(second.record().created, first.record().created);
        assert_eq!(second.record().docstatus, DocumentStatus::Uploaded);
        assert_eq!(registry.list().await.unwrap().len(), 2);
        assert_eq!(queue.depth().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_same_bytes_new_filename_gets_own_record() {
        let dir = TempDir::new().unwrap();
        let (stage, queue, registry) = stage(&dir).await;

        let pdf = minimal_pdf(&["Shared bytes, two names."]);
        let store = LocalObjectStore::new(dir.path()).unwrap();
        store.put("a.pdf", &pdf).await.unwrap();
        store.put("b.pdf", &pdf).await.unwrap();

        let first = stage
            .handle_event(&StorageEvent::new("a.pdf", pdf.len() as u64))
            .await
            .unwrap();
        let second = stage
            .handle_event(&StorageEvent::new("b.pdf", pdf.len() as u64))
            .await
            .unwrap();

        assert!(matches!(second, IngestOutcome::Created(_)));
        assert_eq!(second.record().filename, "b.pdf");
        assert_eq!(
            first.record().document_id,
            second.record().document_id
        );
        assert_eq!(registry.list().await.unwrap().len(), 2);

        // each task carries its own key, so artifacts land under each
        // filename's prefix
        assert_eq!(queue.depth().await.unwrap(), 2);
        let lease = queue.receive().await.unwrap().unwrap();
        assert_eq!(lease.task.key, "a.pdf");
    }

    #[tokio::test]
    async fn test_missing_object_fails() {
        let dir = TempDir::new().unwrap();
        let (stage, _queue, _registry) = stage(&dir).await;
        let err = stage
            .handle_event(&StorageEvent::new("ghost.pdf", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
