//! Embedding task queue

pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::task::{EmbedTask, TaskLease};

pub use sqlite::SqliteTaskQueue;

/// At-least-once delivery queue between the ingestion and embedding
/// stages.
///
/// `receive` leases a task: the task stays in the queue but is invisible
/// until its visibility deadline passes. An acked lease removes the task;
/// an unacked one is redelivered, so consumers must tolerate duplicates.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn send(&self, task: &EmbedTask) -> Result<()>;

    /// Claim the oldest visible task, if any
    async fn receive(&self) -> Result<Option<TaskLease>>;

    /// Remove a completed task from the queue
    async fn ack(&self, lease: &TaskLease) -> Result<()>;

    /// Number of tasks not yet acked (visible or leased)
    async fn depth(&self) -> Result<usize>;

    fn name(&self) -> &str;
}
