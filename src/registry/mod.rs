//! Document record registry

pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::document::{DocumentKey, DocumentRecord, DocumentStatus};

pub use sqlite::SqliteRegistry;

/// Persistent store of document records keyed by (document_id, created).
///
/// `transition` is the only way to change a record's status. It applies
/// the write conditionally on the current status so that concurrent
/// workers cannot resurrect a terminal record or skip a state.
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    /// Insert a new record. Fails if the key already exists.
    async fn put(&self, record: &DocumentRecord) -> Result<()>;

    async fn get(&self, key: &DocumentKey) -> Result<Option<DocumentRecord>>;

    /// Most recent record for a filename
    async fn find_by_filename(&self, filename: &str) -> Result<Option<DocumentRecord>>;

    /// All records, newest first
    async fn list(&self) -> Result<Vec<DocumentRecord>>;

    /// Conditionally advance a record's status.
    ///
    /// The write succeeds only when the stored status can legally advance
    /// to `next`; otherwise `Error::InvalidTransition` (or `NotFound`) is
    /// returned and the record is untouched. `error` is recorded when
    /// `next` is `Failed` and cleared otherwise.
    async fn transition(
        &self,
        key: &DocumentKey,
        next: DocumentStatus,
        error: Option<&str>,
    ) -> Result<DocumentRecord>;

    fn name(&self) -> &str;
}
