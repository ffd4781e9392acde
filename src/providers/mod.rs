//! Embedding and answer model provider traits

pub mod mock;
pub mod ollama;

use async_trait::async_trait;

use crate::error::Result;

pub use mock::{MockAnswerModel, MockEmbedder};
pub use ollama::{OllamaAnswerModel, OllamaClient, OllamaEmbedder};

/// Turns text into fixed-length embedding vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;

    /// Embedding model identifier, recorded in index artifacts
    fn model(&self) -> &str;

    fn name(&self) -> &str;

    async fn health_check(&self) -> Result<()> {
        self.embed("health check").await.map(|_| ())
    }
}

/// Generates an answer from a fully rendered prompt
#[async_trait]
pub trait AnswerModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn model(&self) -> &str;

    fn name(&self) -> &str;
}
