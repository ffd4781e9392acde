//! SQLite-backed document registry

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::registry::DocumentRegistry;
use crate::types::document::{DocumentKey, DocumentRecord, DocumentStatus};

pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Registry(format!("cannot create {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Registry(format!("cannot open {}: {e}", path.display())))?;
        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        registry.migrate()?;
        Ok(registry)
    }

    /// In-memory registry for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Registry(format!("cannot open in-memory db: {e}")))?;
        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        registry.migrate()?;
        Ok(registry)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT NOT NULL,
                created     TEXT NOT NULL,
                filename    TEXT NOT NULL,
                pages       TEXT NOT NULL,
                filesize    TEXT NOT NULL,
                docstatus   TEXT NOT NULL,
                error       TEXT,
                PRIMARY KEY (document_id, created)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_filename
                ON documents(filename, created DESC);
            "#,
        )
        .map_err(|e| Error::Registry(format!("migration failed: {e}")))?;
        Ok(())
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(DocumentRecord, String)> {
        let status_raw: String = row.get(5)?;
        Ok((
            DocumentRecord {
                document_id: row.get(0)?,
                created: row.get(1)?,
                filename: row.get(2)?,
                pages: row.get(3)?,
                filesize: row.get(4)?,
                // patched below once the raw status is parsed
                docstatus: DocumentStatus::Uploaded,
                error: row.get(6)?,
            },
            status_raw,
        ))
    }

    fn finish(pair: (DocumentRecord, String)) -> Result<DocumentRecord> {
        let (mut record, raw) = pair;
        record.docstatus = DocumentStatus::parse(&raw)?;
        Ok(record)
    }

    const SELECT: &'static str =
        "SELECT document_id, created, filename, pages, filesize, docstatus, error FROM documents";
}

#[async_trait]
impl DocumentRegistry for SqliteRegistry {
    async fn put(&self, record: &DocumentRecord) -> Result<()> {
        let conn = self.conn.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO documents
                 (document_id, created, filename, pages, filesize, docstatus, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.document_id,
                    record.created,
                    record.filename,
                    record.pages,
                    record.filesize,
                    record.docstatus.as_str(),
                    record.error,
                ],
            )
            .map_err(|e| Error::Registry(format!("insert failed: {e}")))?;
        if inserted == 0 {
            return Err(Error::Registry(format!(
                "record ({}, {}) already exists",
                record.document_id, record.created
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<DocumentRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("{} WHERE document_id = ?1 AND created = ?2", Self::SELECT),
                params![key.document_id, key.created],
                Self::row_to_record,
            )
            .optional()
            .map_err(|e| Error::Registry(format!("lookup failed: {e}")))?;
        row.map(Self::finish).transpose()
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "{} WHERE filename = ?1 ORDER BY created DESC LIMIT 1",
                    Self::SELECT
                ),
                params![filename],
                Self::row_to_record,
            )
            .optional()
            .map_err(|e| Error::Registry(format!("lookup failed: {e}")))?;
        row.map(Self::finish).transpose()
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY created DESC", Self::SELECT))
            .map_err(|e| Error::Registry(format!("list failed: {e}")))?;
        let rows = stmt
            .query_map([], Self::row_to_record)
            .map_err(|e| Error::Registry(format!("list failed: {e}")))?;
        let mut records = Vec::new();
        for row in rows {
            let pair = row.map_err(|e| Error::Registry(format!("list failed: {e}")))?;
            records.push(Self::finish(pair)?);
        }
        Ok(records)
    }

    async fn transition(
        &self,
        key: &DocumentKey,
        next: DocumentStatus,
        error: Option<&str>,
    ) -> Result<DocumentRecord> {
        // statuses from which `next` is legally reachable
        let allowed: Vec<&str> = [
            DocumentStatus::Uploaded,
            DocumentStatus::Processing,
            DocumentStatus::Ready,
            DocumentStatus::Failed,
        ]
        .iter()
        .filter(|s| s.can_advance_to(next))
        .map(|s| s.as_str())
        .collect();

        if allowed.is_empty() {
            let current = self.get(key).await?.ok_or_else(|| {
                Error::NotFound(format!("document ({}, {})", key.document_id, key.created))
            })?;
            return Err(Error::InvalidTransition {
                from: current.docstatus,
                to: next,
            });
        }

        let conn = self.conn.lock();

        let placeholders = allowed
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 5))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE documents SET docstatus = ?1, error = ?2
             WHERE document_id = ?3 AND created = ?4 AND docstatus IN ({placeholders})"
        );

        let error_value = if next == DocumentStatus::Failed {
            error
        } else {
            None
        };

        let next_str = next.as_str();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![
            &next_str as &dyn rusqlite::ToSql,
            &error_value,
            &key.document_id,
            &key.created,
        ];
        for status in &allowed {
            values.push(status as &dyn rusqlite::ToSql);
        }

        let updated = conn
            .execute(&sql, values.as_slice())
            .map_err(|e| Error::Registry(format!("transition failed: {e}")))?;

        let current = conn
            .query_row(
                &format!("{} WHERE document_id = ?1 AND created = ?2", Self::SELECT),
                params![key.document_id, key.created],
                Self::row_to_record,
            )
            .optional()
            .map_err(|e| Error::Registry(format!("lookup failed: {e}")))?;

        let record = match current {
            Some(pair) => Self::finish(pair)?,
            None => {
                return Err(Error::NotFound(format!(
                    "document ({}, {})",
                    key.document_id, key.created
                )))
            }
        };

        if updated == 0 {
            return Err(Error::InvalidTransition {
                from: record.docstatus,
                to: next,
            });
        }
        Ok(record)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, created: &str, filename: &str) -> DocumentRecord {
        DocumentRecord::new(id, created, filename, 3, 1024)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let rec = record("aaa", "2024-01-01T00:00:00.000000Z", "a.pdf");
        registry.put(&rec).await.unwrap();

        let loaded = registry.get(&rec.key()).await.unwrap().unwrap();
        assert_eq!(loaded.filename, "a.pdf");
        assert_eq!(loaded.pages, "3");
        assert_eq!(loaded.docstatus, DocumentStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_duplicate_put_rejected() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let rec = record("aaa", "2024-01-01T00:00:00.000000Z", "a.pdf");
        registry.put(&rec).await.unwrap();
        assert!(registry.put(&rec).await.is_err());
    }

    #[tokio::test]
    async fn test_transition_happy_path() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let rec = record("aaa", "2024-01-01T00:00:00.000000Z", "a.pdf");
        registry.put(&rec).await.unwrap();

        let rec = registry
            .transition(&rec.key(), DocumentStatus::Processing, None)
            .await
            .unwrap();
        assert_eq!(rec.docstatus, DocumentStatus::Processing);

        let rec = registry
            .transition(&rec.key(), DocumentStatus::Ready, None)
            .await
            .unwrap();
        assert_eq!(rec.docstatus, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn test_transition_rejects_skip() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let rec = record("aaa", "2024-01-01T00:00:00.000000Z", "a.pdf");
        registry.put(&rec).await.unwrap();

        let err = registry
            .transition(&rec.key(), DocumentStatus::Ready, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        // record untouched
        let current = registry.get(&rec.key()).await.unwrap().unwrap();
        assert_eq!(current.docstatus, DocumentStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_terminal_records_stay_terminal() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let rec = record("aaa", "2024-01-01T00:00:00.000000Z", "a.pdf");
        registry.put(&rec).await.unwrap();
        registry
            .transition(&rec.key(), DocumentStatus::Processing, None)
            .await
            .unwrap();
        registry
            .transition(&rec.key(), DocumentStatus::Failed, Some("parse error"))
            .await
            .unwrap();

        let err = registry
            .transition(&rec.key(), DocumentStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        let current = registry.get(&rec.key()).await.unwrap().unwrap();
        assert_eq!(current.docstatus, DocumentStatus::Failed);
        assert_eq!(current.error.as_deref(), Some("parse error"));
    }

    #[tokio::test]
    async fn test_redelivery_reclaims_processing() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let rec = record("aaa", "2024-01-01T00:00:00.000000Z", "a.pdf");
        registry.put(&rec).await.unwrap();
        registry
            .transition(&rec.key(), DocumentStatus::Processing, None)
            .await
            .unwrap();
        // a redelivered task claims the same document again
        let rec = registry
            .transition(&rec.key(), DocumentStatus::Processing, None)
            .await
            .unwrap();
        assert_eq!(rec.docstatus, DocumentStatus::Processing);
    }

    #[tokio::test]
    async fn test_transition_missing_record() {
        let registry = SqliteRegistry::in_memory().unwrap();
        let key = DocumentKey::new("nope", "2024-01-01T00:00:00.000000Z");
        let err = registry
            .transition(&key, DocumentStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_find_latest_by_filename() {
        let registry = SqliteRegistry::in_memory().unwrap();
        registry
            .put(&record("aaa", "2024-01-01T00:00:00.000000Z", "a.pdf"))
            .await
            .unwrap();
        registry
            .put(&record("bbb", "2024-02-01T00:00:00.000000Z", "a.pdf"))
            .await
            .unwrap();

        let latest = registry.find_by_filename("a.pdf").await.unwrap().unwrap();
        assert_eq!(latest.document_id, "bbb");
        assert!(registry.find_by_filename("z.pdf").await.unwrap().is_none());
    }
}
