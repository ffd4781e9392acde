//! Document records and the processing status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Timestamp format used for the `created` field. Microsecond precision,
/// UTC, literal `Z` suffix. Part of the document identity, so the format
/// is fixed.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Number of hex characters of the content hash used as document id
const DOCUMENT_ID_LEN: usize = 16;

/// Format a timestamp for the `created` field
pub fn format_created(when: DateTime<Utc>) -> String {
    when.format(TIMESTAMP_FORMAT).to_string()
}

/// Derive a deterministic document id from the raw object bytes.
///
/// Two uploads of identical bytes produce the same id, so duplicate
/// storage events converge on a single record instead of forking.
pub fn derive_document_id(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)[..DOCUMENT_ID_LEN].to_string()
}

/// Processing status of a document.
///
/// Legal transitions:
///
/// ```text
/// UPLOADED ---> PROCESSING ---> READY
///     \             |  ^
///      \            |  | (task redelivery)
///       \           v  /
///        +------> FAILED
/// ```
///
/// `Ready` and `Failed` are terminal. Re-processing a terminal document
/// requires a fresh upload, which produces a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    /// Whether the machine permits moving from `self` to `next`.
    ///
    /// `Processing -> Processing` is allowed so that a redelivered
    /// embedding task can re-claim a document it already started on.
    pub fn can_advance_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Uploaded, Failed)
                | (Processing, Processing)
                | (Processing, Ready)
                | (Processing, Failed)
        )
    }

    /// Validate a transition, returning the new status or an error
    pub fn advance(self, next: DocumentStatus) -> Result<DocumentStatus> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Ready | DocumentStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Ready => "READY",
            DocumentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "UPLOADED" => Ok(DocumentStatus::Uploaded),
            "PROCESSING" => Ok(DocumentStatus::Processing),
            "READY" => Ok(DocumentStatus::Ready),
            "FAILED" => Ok(DocumentStatus::Failed),
            other => Err(Error::Registry(format!("unknown docstatus '{other}'"))),
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite identity of a document record: content-derived id plus the
/// creation timestamp of this particular upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentKey {
    pub document_id: String,
    pub created: String,
}

impl DocumentKey {
    pub fn new(document_id: impl Into<String>, created: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            created: created.into(),
        }
    }
}

/// A tracked document and its processing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(rename = "documentid")]
    pub document_id: String,
    pub created: String,
    pub filename: String,
    /// Page count, string-encoded for wire compatibility
    pub pages: String,
    /// Object size in bytes, string-encoded for wire compatibility
    pub filesize: String,
    pub docstatus: DocumentStatus,
    /// Failure cause, populated only when `docstatus` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentRecord {
    pub fn new(
        document_id: impl Into<String>,
        created: impl Into<String>,
        filename: impl Into<String>,
        pages: u32,
        filesize: u64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            created: created.into(),
            filename: filename.into(),
            pages: pages.to_string(),
            filesize: filesize.to_string(),
            docstatus: DocumentStatus::Uploaded,
            error: None,
        }
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.document_id.clone(), self.created.clone())
    }
}

/// A single chunk of extracted page text, ready for embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id: `<document_id>:<page>:<seq>`
    pub id: String,
    /// 1-based page number the chunk was extracted from
    pub page: u32,
    pub content: String,
    /// Byte span within the page text this chunk was drawn from
    pub char_start: usize,
    pub char_end: usize,
}

impl Chunk {
    pub fn new(document_id: &str, page: u32, seq: usize, content: impl Into<String>) -> Self {
        let content = content.into();
        let char_end = content.len();
        Self {
            id: format!("{document_id}:{page}:{seq}"),
            page,
            content,
            char_start: 0,
            char_end,
        }
    }

    pub fn with_span(
        document_id: &str,
        page: u32,
        seq: usize,
        content: impl Into<String>,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        Self {
            char_start,
            char_end,
            ..Self::new(document_id, page, seq, content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use DocumentStatus::*;
        assert!(Uploaded.can_advance_to(Processing));
        assert!(Uploaded.can_advance_to(Failed));
        assert!(Processing.can_advance_to(Ready));
        assert!(Processing.can_advance_to(Failed));
        // redelivered task may re-enter Processing
        assert!(Processing.can_advance_to(Processing));
    }

    #[test]
    fn test_illegal_transitions() {
        use DocumentStatus::*;
        assert!(!Uploaded.can_advance_to(Ready));
        assert!(!Uploaded.can_advance_to(Uploaded));
        assert!(!Processing.can_advance_to(Uploaded));
        // terminal states never move again
        for next in [Uploaded, Processing, Ready, Failed] {
            assert!(!Ready.can_advance_to(next));
            assert!(!Failed.can_advance_to(next));
        }
    }

    #[test]
    fn test_advance_rejects_with_context() {
        let err = DocumentStatus::Ready
            .advance(DocumentStatus::Processing)
            .unwrap_err();
        match err {
            crate::error::Error::InvalidTransition { from, to } => {
                assert_eq!(from, DocumentStatus::Ready);
                assert_eq!(to, DocumentStatus::Processing);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            DocumentStatus::Uploaded,
            DocumentStatus::Processing,
            DocumentStatus::Ready,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(DocumentStatus::parse("DONE").is_err());
    }

    #[test]
    fn test_document_id_is_deterministic() {
        let a = derive_document_id(b"same bytes");
        let b = derive_document_id(b"same bytes");
        let c = derive_document_id(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_created_format() {
        let when = DateTime::parse_from_rfc3339("2024-03-01T09:30:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_created(when), "2024-03-01T09:30:00.123456Z");
    }

    #[test]
    fn test_record_serializes_wire_field_names() {
        let record = DocumentRecord::new("abc123", "2024-03-01T09:30:00.000000Z", "report.pdf", 3, 2048);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["documentid"], "abc123");
        assert_eq!(json["pages"], "3");
        assert_eq!(json["filesize"], "2048");
        assert_eq!(json["docstatus"], "UPLOADED");
        assert!(json.get("error").is_none());
    }
}
