//! Background worker draining the embedding task queue

use std::time::Duration;

use tracing::{error, info, warn};

use crate::server::state::AppState;

/// Poll the queue and run the embedding stage on each claimed task.
///
/// Ack policy: a task is acked when it succeeded or failed permanently.
/// Transient failures leave the lease to expire so the queue redelivers
/// the task.
pub async fn run(state: AppState) {
    let poll_interval = Duration::from_millis(state.config.queue.poll_interval_ms);
    info!("worker started (poll interval {poll_interval:?})");

    loop {
        let lease = match state.queue.receive().await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tokio::time::sleep(poll_interval).await;
                continue;
            }
            Err(e) => {
                error!("queue receive failed: {e}");
                tokio::time::sleep(poll_interval).await;
                continue;
            }
        };

        let document_id = lease.task.document_id.clone();
        let ack = match state.embed.handle_task(&lease.task).await {
            Ok(_) => true,
            Err(e) if e.is_retryable() => {
                warn!("task for {document_id} failed transiently (attempt {}): {e}", lease.attempts);
                false
            }
            Err(e) => {
                warn!("task for {document_id} failed permanently: {e}");
                true
            }
        };

        if ack {
            if let Err(e) = state.queue.ack(&lease).await {
                error!("ack failed for {document_id}: {e}");
            }
        }
    }
}
