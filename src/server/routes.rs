//! HTTP route handlers

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::storage::StorageEvent;
use crate::types::document::DocumentRecord;
use crate::types::query::{QueryAnswer, QueryRequest};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "docchat",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Accept a PDF upload, store it, and run the ingestion stage on the
/// resulting storage event.
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentRecord>)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| Error::Storage(format!("invalid multipart body: {e}")))?
        .ok_or_else(|| Error::Config("no file in upload".into()))?;

    let filename = field
        .file_name()
        .map(sanitize_filename)
        .transpose()?
        .ok_or_else(|| Error::Config("upload is missing a filename".into()))?;
    let data = field
        .bytes()
        .await
        .map_err(|e| Error::Storage(format!("upload read failed: {e}")))?;
    if data.is_empty() {
        return Err(Error::Config(format!("'{filename}' is empty")));
    }
    info!("[{filename}] received upload ({} bytes)", data.len());

    state.store.put(&filename, &data).await?;
    let event = StorageEvent::new(filename, data.len() as u64);
    let outcome = state.ingest.handle_event(&event).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome.record().clone())))
}

pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentRecord>>> {
    Ok(Json(state.registry.list().await?))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<DocumentRecord>> {
    let record = state
        .registry
        .find_by_filename(&filename)
        .await?
        .ok_or_else(|| Error::NotFound(format!("document '{filename}'")))?;
    Ok(Json(record))
}

pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>> {
    if request.question.trim().is_empty() {
        return Err(Error::Config("question must not be empty".into()));
    }
    Ok(Json(state.query.answer(&request).await?))
}

/// Uploaded filenames become object keys, so strip any path component
/// and reject names that would collide with key syntax.
fn sanitize_filename(raw: &str) -> Result<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::Config(format!("invalid filename '{raw}'")));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_paths() {
        assert_eq!(sanitize_filename("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_filename("/tmp/report.pdf").unwrap(), "report.pdf");
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\report.pdf").unwrap(),
            "report.pdf"
        );
    }

    #[test]
    fn test_sanitize_rejects_bad_names() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("dir/").is_err());
    }
}
