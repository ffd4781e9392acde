//! Grounded prompt construction

use crate::index::ScoredChunk;
use crate::types::query::ChatTurn;

/// Header line introducing the retrieved context. The answer model's
/// instructions reference it by name, so it is a fixed marker.
pub const CONTEXT_MARKER: &str = "CONTEXT:";

/// Builds the prompt handed to the answer model
pub struct PromptBuilder {
    include_history: bool,
}

impl PromptBuilder {
    pub fn new(include_history: bool) -> Self {
        Self { include_history }
    }

    /// Render retrieved chunks as a numbered context block
    pub fn build_context(&self, filename: &str, hits: &[ScoredChunk]) -> String {
        let mut out = String::new();
        for (i, hit) in hits.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {}, page {}\n{}\n\n",
                i + 1,
                filename,
                hit.chunk.page,
                hit.chunk.content
            ));
        }
        out.trim_end().to_string()
    }

    /// Full prompt: instructions, optional history, context, question.
    ///
    /// The instructions pin the model to the context block so answers
    /// stay grounded in the document.
    pub fn build(
        &self,
        filename: &str,
        question: &str,
        hits: &[ScoredChunk],
        history: &[ChatTurn],
    ) -> String {
        let mut prompt = String::from(
            "You are a document assistant. Answer the question using ONLY the \
             numbered excerpts in the CONTEXT section below.\n\
             If the context does not contain the answer, say you don't have \
             enough information. Do not invent facts.\n\n",
        );

        if self.include_history && !history.is_empty() {
            prompt.push_str("PRIOR CONVERSATION:\n");
            for turn in history {
                prompt.push_str(&format!("User: {}\n", turn.user));
                prompt.push_str(&format!("Assistant: {}\n", turn.assistant));
            }
            prompt.push('\n');
        }

        prompt.push_str(CONTEXT_MARKER);
        prompt.push('\n');
        if hits.is_empty() {
            prompt.push_str("(no relevant excerpts were found)\n");
        } else {
            prompt.push_str(&self.build_context(filename, hits));
            prompt.push('\n');
        }

        prompt.push_str(&format!("\nQUESTION: {question}\n\nANSWER:"));
        prompt
    }
}
