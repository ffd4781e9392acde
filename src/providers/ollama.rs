//! Ollama-backed embedding and generation providers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EmbeddingsConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::providers::{AnswerModel, Embedder};

/// Shared HTTP client for a local Ollama instance
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn embeddings(&self, model: &str, prompt: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
        }
        #[derive(Deserialize)]
        struct Response {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&Request { model, prompt })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Embedding(format!(
                "ollama returned {} for model '{model}'",
                response.status()
            )));
        }
        let body: Response = response.json().await?;
        if body.embedding.is_empty() {
            return Err(Error::Embedding(format!(
                "ollama returned empty embedding for model '{model}'"
            )));
        }
        Ok(body.embedding)
    }

    async fn generate(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: Options,
        }
        #[derive(Serialize)]
        struct Options {
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Response {
            response: String,
        }

        let url = format!("{}/api/generate", self.base_url);
        debug!("generating with '{model}' ({} prompt chars)", prompt.len());
        let response = self
            .client
            .post(&url)
            .json(&Request {
                model,
                prompt,
                stream: false,
                options: Options { temperature },
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Generation(format!(
                "ollama returned {} for model '{model}'",
                response.status()
            )));
        }
        let body: Response = response.json().await?;
        Ok(body.response.trim().to_string())
    }
}

pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(client: Arc<OllamaClient>, config: &EmbeddingsConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            dimensions: config.dimensions,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.client.embeddings(&self.model, text).await?;
        if embedding.len() != self.dimensions {
            return Err(Error::Embedding(format!(
                "model '{}' returned {} dimensions, configured {}",
                self.model,
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

pub struct OllamaAnswerModel {
    client: Arc<OllamaClient>,
    model: String,
    temperature: f32,
}

impl OllamaAnswerModel {
    pub fn new(client: Arc<OllamaClient>, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl AnswerModel for OllamaAnswerModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.client
            .generate(&self.model, prompt, self.temperature)
            .await
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
