//! Per-document similarity index and its persisted artifacts
//!
//! Each READY document has two artifacts in the object store under its
//! filename prefix:
//!
//! * `<filename>/index.vec` is a bincode-encoded vector segment holding
//!   the embedding for every chunk.
//! * `<filename>/index.meta.json` is JSON metadata holding chunk text,
//!   page numbers, and the embedding model name.
//!
//! Both formats are plain data. Loading them never executes code and
//! every field is validated before the index is usable.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::document::Chunk;

/// Artifact key suffixes under the document's filename prefix
pub const VECTOR_ARTIFACT: &str = "index.vec";
pub const META_ARTIFACT: &str = "index.meta.json";

/// Bump when either artifact layout changes
pub const ARTIFACT_VERSION: u32 = 1;

/// Object store keys for a document's artifacts
pub fn artifact_keys(filename: &str) -> (String, String) {
    (
        format!("{filename}/{VECTOR_ARTIFACT}"),
        format!("{filename}/{META_ARTIFACT}"),
    )
}

/// Binary artifact: one embedding per chunk, in chunk order
#[derive(Debug, Serialize, Deserialize)]
struct VectorSegment {
    version: u32,
    dimensions: u32,
    entries: Vec<VectorEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorEntry {
    id: String,
    vector: Vec<f32>,
}

/// JSON artifact: chunk text and provenance
#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    version: u32,
    source_key: String,
    embed_model: String,
    chunks: Vec<ChunkMeta>,
}

/// One chunk as stored in the metadata artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub id: String,
    pub page: u32,
    pub content: String,
}

/// A retrieval hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkMeta,
    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
}

/// In-memory exact cosine index over one document's chunks.
///
/// Vectors are L2-normalized at build/load time so search is a dot
/// product scan. Exact scan is adequate at single-document scale.
#[derive(Debug)]
pub struct SimilarityIndex {
    dimensions: usize,
    source_key: String,
    embed_model: String,
    chunks: Vec<ChunkMeta>,
    vectors: Vec<Vec<f32>>,
}

impl SimilarityIndex {
    /// Build an index from chunks and their freshly computed embeddings
    pub fn build(
        source_key: impl Into<String>,
        embed_model: impl Into<String>,
        dimensions: usize,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(Error::IndexArtifact(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Err(Error::IndexArtifact("no chunks to index".into()));
        }
        let mut vectors = Vec::with_capacity(embeddings.len());
        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            if embedding.len() != dimensions {
                return Err(Error::IndexArtifact(format!(
                    "chunk '{}' has {} dimensions, expected {dimensions}",
                    chunk.id,
                    embedding.len()
                )));
            }
            vectors.push(normalize(embedding));
        }
        Ok(Self {
            dimensions,
            source_key: source_key.into(),
            embed_model: embed_model.into(),
            chunks: chunks
                .into_iter()
                .map(|c| ChunkMeta {
                    id: c.id,
                    page: c.page,
                    content: c.content,
                })
                .collect(),
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// Top-k most similar chunks to a query embedding
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dimensions {
            return Err(Error::IndexArtifact(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimensions
            )));
        }
        let query = normalize(query);
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .zip(&self.vectors)
            .map(|(chunk, vector)| ScoredChunk {
                chunk: chunk.clone(),
                similarity: dot(&query, vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Serialize to (vector, metadata) artifact bytes
    pub fn to_artifacts(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let segment = VectorSegment {
            version: ARTIFACT_VERSION,
            dimensions: self.dimensions as u32,
            entries: self
                .chunks
                .iter()
                .zip(&self.vectors)
                .map(|(chunk, vector)| VectorEntry {
                    id: chunk.id.clone(),
                    vector: vector.clone(),
                })
                .collect(),
        };
        let vec_bytes = bincode::serde::encode_to_vec(&segment, bincode::config::standard())
            .map_err(|e| Error::IndexArtifact(format!("vector encode failed: {e}")))?;

        let meta = IndexMeta {
            version: ARTIFACT_VERSION,
            source_key: self.source_key.clone(),
            embed_model: self.embed_model.clone(),
            chunks: self.chunks.clone(),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)?;
        Ok((vec_bytes, meta_bytes))
    }

    /// Load and validate an index from its two artifacts.
    ///
    /// Rejects version mismatches, dimension mismatches, and vector/chunk
    /// id misalignment instead of serving a corrupt index.
    pub fn from_artifacts(vec_bytes: &[u8], meta_bytes: &[u8]) -> Result<Self> {
        let (segment, _): (VectorSegment, usize) =
            bincode::serde::decode_from_slice(vec_bytes, bincode::config::standard())
                .map_err(|e| Error::IndexArtifact(format!("vector decode failed: {e}")))?;
        let meta: IndexMeta = serde_json::from_slice(meta_bytes)
            .map_err(|e| Error::IndexArtifact(format!("metadata decode failed: {e}")))?;

        if segment.version != ARTIFACT_VERSION || meta.version != ARTIFACT_VERSION {
            return Err(Error::IndexArtifact(format!(
                "artifact version {}/{} unsupported (expected {ARTIFACT_VERSION})",
                segment.version, meta.version
            )));
        }
        if segment.entries.len() != meta.chunks.len() {
            return Err(Error::IndexArtifact(format!(
                "{} vectors but {} chunks",
                segment.entries.len(),
                meta.chunks.len()
            )));
        }
        let dimensions = segment.dimensions as usize;
        let mut vectors = Vec::with_capacity(segment.entries.len());
        for (entry, chunk) in segment.entries.into_iter().zip(&meta.chunks) {
            if entry.id != chunk.id {
                return Err(Error::IndexArtifact(format!(
                    "vector id '{}' does not match chunk id '{}'",
                    entry.id, chunk.id
                )));
            }
            if entry.vector.len() != dimensions {
                return Err(Error::IndexArtifact(format!(
                    "vector '{}' has {} dimensions, segment declares {dimensions}",
                    entry.id,
                    entry.vector.len()
                )));
            }
            vectors.push(normalize(&entry.vector));
        }

        Ok(Self {
            dimensions,
            source_key: meta.source_key,
            embed_model: meta.embed_model,
            chunks: meta.chunks,
            vectors,
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
