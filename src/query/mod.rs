//! Query stage: question against a READY document

pub mod prompt;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::index::{artifact_keys, SimilarityIndex};
use crate::providers::{AnswerModel, Embedder};
use crate::registry::DocumentRegistry;
use crate::storage::ObjectStore;
use crate::types::document::DocumentStatus;
use crate::types::query::{QueryAnswer, QueryRequest, SourceRef};

pub use prompt::PromptBuilder;

const ARTIFACT_TIMEOUT: Duration = Duration::from_secs(15);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const SNIPPET_MAX_CHARS: usize = 240;

/// Answers questions against indexed documents.
///
/// The document must be READY; anything else is rejected up front with
/// its current status so callers can distinguish "still processing" from
/// "failed" from "unknown".
pub struct QueryStage {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn DocumentRegistry>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn AnswerModel>,
    prompt: PromptBuilder,
    default_top_k: usize,
}

impl QueryStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn DocumentRegistry>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn AnswerModel>,
        config: &QueryConfig,
    ) -> Self {
        Self {
            store,
            registry,
            embedder,
            model,
            prompt: PromptBuilder::new(config.include_history),
            default_top_k: config.top_k,
        }
    }

    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryAnswer> {
        let started = Instant::now();
        let filename = &request.filename;

        let record = self
            .registry
            .find_by_filename(filename)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document '{filename}'")))?;
        if record.docstatus != DocumentStatus::Ready {
            return Err(Error::NotReady {
                filename: filename.clone(),
                status: record.docstatus,
            });
        }

        let index = self.load_index(filename).await?;

        let query_vector = self.embedder.embed(&request.question).await?;
        let top_k = if request.top_k > 0 {
            request.top_k
        } else {
            self.default_top_k
        };
        let hits = index.search(&query_vector, top_k)?;
        info!(
            "[{filename}] {} hits for question ({} chars)",
            hits.len(),
            request.question.len()
        );

        let prompt = self
            .prompt
            .build(filename, &request.question, &hits, &request.history);
        let answer = tokio::time::timeout(GENERATE_TIMEOUT, self.model.generate(&prompt))
            .await
            .map_err(|_| Error::Timeout {
                operation: "generate answer".to_string(),
                secs: GENERATE_TIMEOUT.as_secs(),
            })??;

        let sources = hits
            .into_iter()
            .map(|hit| SourceRef {
                page: hit.chunk.page,
                snippet: snippet(&hit.chunk.content),
                similarity: hit.similarity,
            })
            .collect();

        Ok(QueryAnswer {
            answer,
            sources,
            model: self.model.model().to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn load_index(&self, filename: &str) -> Result<SimilarityIndex> {
        let (vec_key, meta_key) = artifact_keys(filename);
        let load = async {
            let vec_bytes = self.store.get(&vec_key).await?;
            let meta_bytes = self.store.get(&meta_key).await?;
            Ok::<_, Error>((vec_bytes, meta_bytes))
        };
        let (vec_bytes, meta_bytes) = tokio::time::timeout(ARTIFACT_TIMEOUT, load)
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("load index for '{filename}'"),
                secs: ARTIFACT_TIMEOUT.as_secs(),
            })??;
        SimilarityIndex::from_artifacts(&vec_bytes, &meta_bytes)
    }
}

/// First sentence-ish prefix of a chunk for the sources list
fn snippet(content: &str) -> String {
    if content.len() <= SNIPPET_MAX_CHARS {
        return content.to_string();
    }
    let mut end = SNIPPET_MAX_CHARS;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &content[..end].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_short_content_untouched() {
        assert_eq!(snippet("short"), "short");
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let s = snippet(&long);
        assert!(s.ends_with('…'));
        assert!(s.len() <= SNIPPET_MAX_CHARS + '…'.len_utf8());
    }
}
