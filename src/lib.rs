//! docchat: PDF document chat pipeline
//!
//! Three stages connected by an object store, a document registry, and a
//! task queue:
//!
//! 1. **Ingestion** registers an uploaded PDF and enqueues an embedding
//!    task.
//! 2. **Embedding** chunks the document, embeds every chunk, and writes
//!    a per-document similarity index to the object store.
//! 3. **Query** retrieves the most relevant chunks for a question and
//!    asks an answer model for a grounded response.
//!
//! Document progress is tracked by an explicit state machine
//! (UPLOADED, PROCESSING, READY, FAILED) with conditional writes, so
//! duplicate events and redelivered tasks converge instead of corrupting
//! state.

pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod providers;
pub mod query;
pub mod queue;
pub mod registry;
pub mod server;
pub mod storage;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
#[doc(hidden)]
pub mod test_support;

pub use config::DocChatConfig;
pub use error::{Error, Result};
