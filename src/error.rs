//! Error types for the document chat system

use crate::types::document::DocumentStatus;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the ingestion, embedding, and query stages
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// PDF could not be parsed
    #[error("Failed to parse '{file}': {reason}")]
    PdfParse { file: String, reason: String },

    /// PDF parsed but yielded no extractable text
    #[error("No text content could be extracted from '{0}'")]
    EmptyDocument(String),

    /// Object store failure (download/upload/list)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Document record store failure
    #[error("Registry error: {0}")]
    Registry(String),

    /// Task queue failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Embedding provider failure
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Answer model failure
    #[error("Generation error: {0}")]
    Generation(String),

    /// Persisted index artifact is missing, corrupt, or fails validation
    #[error("Index artifact error: {0}")]
    IndexArtifact(String),

    /// A status transition the state machine does not permit
    #[error("Illegal status transition: {from} -> {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Query against a document whose index has not been built yet
    #[error("Document '{filename}' is not ready for querying (status: {status})")]
    NotReady {
        filename: String,
        status: DocumentStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// An external call exceeded its deadline
    #[error("Operation '{operation}' timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },
}

impl Error {
    /// Shorthand for PDF parse failures
    pub fn pdf_parse(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::PdfParse {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a redelivered task could plausibly succeed.
    ///
    /// Transient collaborator failures (network, storage, model availability,
    /// timeouts) are retryable; malformed input and state-machine violations
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Http(_)
                | Self::Storage(_)
                | Self::Registry(_)
                | Self::Queue(_)
                | Self::Embedding(_)
                | Self::Generation(_)
                | Self::Timeout { .. }
        )
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::NotReady { .. } => StatusCode::CONFLICT,
            Error::PdfParse { .. } | Error::EmptyDocument(_) | Error::InvalidTransition { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = axum::Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
