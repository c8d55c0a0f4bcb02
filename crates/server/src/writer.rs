//! Write-behind worker.
//!
//! Mutations are acknowledged to clients once the shared tier commits;
//! durable persistence happens here, asynchronously, off a bounded queue.
//! A full queue sheds the write (the shared and in-process tiers stay
//! consistent) and the operator is expected to react to the overflow
//! counter. On shutdown the queue is drained for a bounded time.

use crate::metrics;
use crate::state::Readiness;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tandem_core::model::TodoItem;
use tandem_repository::ListStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// One queued durable mutation.
#[derive(Clone, Debug)]
pub enum WriteOp {
    AddItem(TodoItem),
    /// Carries the full merged item so a replay is a plain upsert.
    UpdateItem(TodoItem),
    DeleteItem {
        item_id: Uuid,
    },
}

impl WriteOp {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddItem(_) => "add_item",
            Self::UpdateItem(_) => "update_item",
            Self::DeleteItem { .. } => "delete_item",
        }
    }
}

/// Worker counters, mirrored into Prometheus and surfaced on `/health`.
#[derive(Default)]
pub struct WriterStats {
    processed: AtomicU64,
    failed: AtomicU64,
    overflow: AtomicU64,
}

/// Snapshot of the worker for the operational surface.
#[derive(Debug, Serialize)]
pub struct WriterSnapshot {
    pub running: bool,
    pub queue_size: usize,
    pub writes_processed: u64,
    pub writes_failed: u64,
    pub queue_overflow: u64,
}

impl WriterStats {
    fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        metrics::WRITES_PROCESSED.inc();
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::WRITES_FAILED.inc();
    }

    fn record_overflow(&self) {
        self.overflow.fetch_add(1, Ordering::Relaxed);
        metrics::WRITE_QUEUE_OVERFLOW.inc();
    }
}

/// Producer half of the write-behind queue. Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteOp>,
    stats: Arc<WriterStats>,
    queue_size: usize,
}

impl WriterHandle {
    /// Enqueue a durable write. Never blocks: when the queue is full the
    /// write is dropped with a warning and an overflow count, and the
    /// caller proceeds.
    pub fn enqueue(&self, op: WriteOp) {
        match self.tx.try_send(op) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(op)) => {
                tracing::warn!(op = op.kind(), "Write queue full, dropping durable write");
                self.stats.record_overflow();
            }
            Err(mpsc::error::TrySendError::Closed(op)) => {
                tracing::warn!(op = op.kind(), "Write worker stopped, dropping durable write");
                self.stats.record_overflow();
            }
        }
    }

    /// Queued entries not yet consumed.
    pub fn queue_depth(&self) -> usize {
        self.queue_size.saturating_sub(self.tx.capacity())
    }

    pub fn snapshot(&self, running: bool) -> WriterSnapshot {
        WriterSnapshot {
            running,
            queue_size: self.queue_depth(),
            writes_processed: self.stats.processed.load(Ordering::Relaxed),
            writes_failed: self.stats.failed.load(Ordering::Relaxed),
            queue_overflow: self.stats.overflow.load(Ordering::Relaxed),
        }
    }
}

/// Spawn the single consumer task. Returns the producer handle and the
/// task handle the shutdown path joins on after signalling `shutdown`.
pub fn spawn(
    repository: Arc<dyn ListStore>,
    queue_size: usize,
    drain: std::time::Duration,
    readiness: Readiness,
    mut shutdown: watch::Receiver<bool>,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<WriteOp>(queue_size);
    let stats = Arc::new(WriterStats::default());
    let handle = WriterHandle {
        tx,
        stats: stats.clone(),
        queue_size,
    };

    let task = tokio::spawn(async move {
        readiness.set_writer(true);
        tracing::info!("Write-behind worker started");

        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(op) => process(repository.as_ref(), &stats, op).await,
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Drain what is already queued, bounded by the configured timeout.
        let deadline = Instant::now() + drain;
        let mut dropped: u64 = 0;
        while let Ok(op) = rx.try_recv() {
            if Instant::now() >= deadline {
                dropped += 1;
                continue;
            }
            process(repository.as_ref(), &stats, op).await;
        }
        if dropped > 0 {
            metrics::WRITES_DROPPED_ON_SHUTDOWN.inc_by(dropped);
            tracing::warn!(dropped, "Unflushed writes dropped at shutdown");
        }

        readiness.set_writer(false);
        tracing::info!("Write-behind worker stopped");
    });

    (handle, task)
}

async fn process(repository: &dyn ListStore, stats: &WriterStats, op: WriteOp) {
    let kind = op.kind();
    let started = Instant::now();

    let result = match &op {
        WriteOp::AddItem(item) => repository.add_item(item).await,
        WriteOp::UpdateItem(item) => repository.update_item(item).await,
        WriteOp::DeleteItem { item_id } => repository.soft_delete_item(*item_id).await,
    };

    metrics::WRITE_DURATION.observe(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            stats.record_processed();
            tracing::debug!(op = kind, "Durable write applied");
        }
        Err(e) => {
            stats.record_failed();
            // Client already got its acknowledgement; log loudly with the
            // payload so the operator can replay by hand.
            tracing::error!(op = kind, error = %e, payload = ?op, "Durable write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::model::{ItemStatus, TodoList};
    use tandem_repository::{ItemRepo, ListRepo, SqliteStore};
    use time::OffsetDateTime;

    async fn seeded_store() -> (Arc<SqliteStore>, TodoList) {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let now = OffsetDateTime::now_utc();
        let list = TodoList {
            id: Uuid::new_v4(),
            name: "Groceries".to_string(),
            owner_id: Uuid::new_v4(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        store.create_list(&list).await.unwrap();
        (store, list)
    }

    fn item(list_id: Uuid) -> TodoItem {
        let now = OffsetDateTime::now_utc();
        TodoItem {
            id: Uuid::new_v4(),
            list_id,
            name: "Milk".to_string(),
            description: None,
            status: ItemStatus::NotStarted,
            done: false,
            due_date: None,
            media_url: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn worker_persists_queued_ops() {
        let (store, list) = seeded_store().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let readiness = Readiness::new();
        let (handle, task) = spawn(
            store.clone(),
            16,
            std::time::Duration::from_secs(5),
            readiness.clone(),
            shutdown_rx,
        );

        let item = item(list.id);
        handle.enqueue(WriteOp::AddItem(item.clone()));

        let mut updated = item.clone();
        updated.status = ItemStatus::Completed;
        updated.done = true;
        handle.enqueue(WriteOp::UpdateItem(updated));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let fetched = store.get_item(item.id).await.unwrap().unwrap();
        assert!(fetched.done);
        assert_eq!(handle.snapshot(false).writes_processed, 2);
        assert!(!readiness.writer_up());
    }

    #[tokio::test]
    async fn full_queue_sheds_writes() {
        // No worker consuming, so the one-slot queue fills immediately.
        let (tx, _rx) = mpsc::channel::<WriteOp>(1);
        let handle = WriterHandle {
            tx,
            stats: Arc::new(WriterStats::default()),
            queue_size: 1,
        };

        handle.enqueue(WriteOp::DeleteItem {
            item_id: Uuid::new_v4(),
        });
        handle.enqueue(WriteOp::DeleteItem {
            item_id: Uuid::new_v4(),
        });

        let snapshot = handle.snapshot(true);
        assert_eq!(snapshot.queue_overflow, 1);
        assert_eq!(snapshot.queue_size, 1);
    }

    #[tokio::test]
    async fn failed_write_is_counted_not_fatal() {
        let (store, _list) = seeded_store().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, task) = spawn(
            store.clone(),
            16,
            std::time::Duration::from_secs(5),
            Readiness::new(),
            shutdown_rx,
        );

        // Item pointing at a list that was never created: the FK rejects it.
        let orphan = item(Uuid::new_v4());
        handle.enqueue(WriteOp::AddItem(orphan));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let snapshot = handle.snapshot(false);
        assert_eq!(snapshot.writes_failed, 1);
        assert_eq!(snapshot.writes_processed, 0);
    }
}
