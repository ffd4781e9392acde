//! Query request and response types

use serde::{Deserialize, Serialize};

fn default_top_k() -> usize {
    5
}

/// One prior exchange in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

/// A question against a previously ingested document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Canonical filename of the document to query
    pub filename: String,
    pub question: String,
    /// Prior conversation turns. Only included in the prompt when the
    /// server is configured to use history.
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl QueryRequest {
    pub fn new(filename: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            question: question.into(),
            history: Vec::new(),
            top_k: default_top_k(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// A retrieved chunk backing an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub page: u32,
    pub snippet: String,
    pub similarity: f32,
}

/// The grounded answer returned by the query stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub model: String,
    pub elapsed_ms: u64,
}
