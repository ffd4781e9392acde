//! SQLite-backed task queue with visibility timeouts

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::queue::TaskQueue;
use crate::types::task::{EmbedTask, TaskLease};

pub struct SqliteTaskQueue {
    conn: Arc<Mutex<Connection>>,
    visibility_timeout_secs: u64,
}

impl SqliteTaskQueue {
    pub fn new(path: impl AsRef<Path>, visibility_timeout_secs: u64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Queue(format!("cannot create {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Queue(format!("cannot open {}: {e}", path.display())))?;
        let queue = Self {
            conn: Arc::new(Mutex::new(conn)),
            visibility_timeout_secs,
        };
        queue.migrate()?;
        Ok(queue)
    }

    /// In-memory queue for tests
    pub fn in_memory(visibility_timeout_secs: u64) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Queue(format!("cannot open in-memory db: {e}")))?;
        let queue = Self {
            conn: Arc::new(Mutex::new(conn)),
            visibility_timeout_secs,
        };
        queue.migrate()?;
        Ok(queue)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS tasks (
                receipt     TEXT PRIMARY KEY,
                body        TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL,
                visible_at  INTEGER NOT NULL,
                attempts    INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_visible
                ON tasks(visible_at, enqueued_at);
            "#,
        )
        .map_err(|e| Error::Queue(format!("migration failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn send(&self, task: &EmbedTask) -> Result<()> {
        let body = serde_json::to_string(task)?;
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tasks (receipt, body, enqueued_at, visible_at, attempts)
             VALUES (?1, ?2, ?3, ?3, 0)",
            params![Uuid::new_v4().to_string(), body, now],
        )
        .map_err(|e| Error::Queue(format!("send failed: {e}")))?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<TaskLease>> {
        let now = Utc::now().timestamp();
        let deadline = now + self.visibility_timeout_secs as i64;
        let conn = self.conn.lock();

        let claimed = conn
            .query_row(
                "SELECT receipt, body, attempts FROM tasks
                 WHERE visible_at <= ?1
                 ORDER BY enqueued_at, rowid LIMIT 1",
                params![now],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::Queue(format!("receive failed: {e}")))?;

        let Some((receipt, body, attempts)) = claimed else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE tasks SET visible_at = ?1, attempts = attempts + 1 WHERE receipt = ?2",
            params![deadline, receipt],
        )
        .map_err(|e| Error::Queue(format!("claim failed: {e}")))?;

        let task: EmbedTask = serde_json::from_str(&body)?;
        Ok(Some(TaskLease {
            receipt,
            attempts: attempts + 1,
            task,
        }))
    }

    async fn ack(&self, lease: &TaskLease) -> Result<()> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute(
                "DELETE FROM tasks WHERE receipt = ?1",
                params![lease.receipt],
            )
            .map_err(|e| Error::Queue(format!("ack failed: {e}")))?;
        if deleted == 0 {
            return Err(Error::Queue(format!("unknown receipt {}", lease.receipt)));
        }
        Ok(())
    }

    async fn depth(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(|e| Error::Queue(format!("depth failed: {e}")))?;
        Ok(count as usize)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
