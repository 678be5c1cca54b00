//! Opaque job queue seam, decoupling the state machine from whatever
//! actually carries a queued job id to a worker. Mirrors the teacher's
//! `core/traits.rs` style: one narrow trait at the boundary, so a future
//! broker (Redis, RabbitMQ, ...) can replace [`InProcessQueue`] without
//! touching [`crate::JobEngine`].

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Hands a freshly created (or requeued) job id to the queue.
    async fn enqueue(&self, job_id: Uuid);

    /// Waits for the next job id, or `None` once the queue is closed.
    async fn consume(&self) -> Option<Uuid>;
}

/// Single-process queue backed by an unbounded channel. The default and
/// only implementation here; nothing in this workspace runs a broker.
pub struct InProcessQueue {
    tx: mpsc::UnboundedSender<Uuid>,
    rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
}

impl InProcessQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

impl Default for InProcessQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InProcessQueue {
    async fn enqueue(&self, job_id: Uuid) {
        if self.tx.send(job_id).is_err() {
            tracing::error!(%job_id, "in-process job queue closed");
        }
    }

    async fn consume(&self) -> Option<Uuid> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueued_jobs_are_consumed_in_order() {
        let queue = InProcessQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.enqueue(a).await;
        queue.enqueue(b).await;
        assert_eq!(queue.consume().await, Some(a));
        assert_eq!(queue.consume().await, Some(b));
    }
}
