//! Deterministic in-process providers for tests and offline development

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::providers::{AnswerModel, Embedder};
use crate::query::prompt::CONTEXT_MARKER;

/// Bag-of-words embedder: each token is hashed into a dimension bucket.
///
/// Texts that share vocabulary get high cosine similarity, so retrieval
/// behaves plausibly without a model. Deterministic across runs.
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dimensions;
            vector[bucket] += 1.0;
        }
        // a text with no tokens still gets a valid non-zero vector
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        "mock-embed"
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Answer model that echoes the context section of the prompt, so tests
/// can assert that retrieved content reached the model.
pub struct MockAnswerModel;

#[async_trait]
impl AnswerModel for MockAnswerModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let answer = match prompt.split(CONTEXT_MARKER).nth(1) {
            Some(rest) => rest.trim().to_string(),
            None => "I don't have enough information to answer that.".to_string(),
        };
        Ok(answer)
    }

    fn model(&self) -> &str {
        "mock-answer"
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    #[tokio::test]
    async fn test_embeddings_deterministic() {
        let embedder = MockEmbedder::new(32);
        let a = embedder.embed("the quarterly report").await.unwrap();
        let b = embedder.embed("the quarterly report").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let embedder = MockEmbedder::new(64);
        let doc = embedder
            .embed("total revenue was four million dollars")
            .await
            .unwrap();
        let related = embedder.embed("what was the total revenue").await.unwrap();
        let unrelated = embedder.embed("penguins live in antarctica").await.unwrap();
        assert!(cosine(&doc, &related) > cosine(&doc, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_still_embeds() {
        let embedder = MockEmbedder::new(16);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().any(|x| *x != 0.0));
    }
}
