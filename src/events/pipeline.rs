//! Bounded event queue drained by a fixed worker pool.
//!
//! Publishing is non-blocking: when the queue is full the event is dropped
//! and logged, never stalling the state machine. Shutdown closes the queue,
//! lets workers drain what is buffered, and waits for them to exit, which
//! also awaits any in-flight persistence.

use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::{Event, EventHandlers, EventSink};

enum QueueItem {
    Event(Box<Event>),
    Shutdown,
}

/// Process-wide event pipeline: one bounded queue, `worker_count` drainers.
pub struct EventPipeline {
    tx: mpsc::Sender<QueueItem>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl EventPipeline {
    /// Spawn the worker pool and return the running pipeline.
    pub fn start(
        queue_size: usize,
        worker_count: usize,
        handlers: Arc<EventHandlers>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let handlers = Arc::clone(&handlers);
                tokio::spawn(worker_loop(worker_id, rx, handlers))
            })
            .collect();

        Arc::new(Self {
            tx,
            workers: Mutex::new(workers),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        })
    }

    /// Enqueue an event without blocking. A full queue drops the event with
    /// one warning per drop.
    pub fn publish(&self, event: Event) {
        if self.closed.load(Ordering::Acquire) {
            debug!("pipeline closed, dropping {} for table {}", event.kind, event.table_id);
            return;
        }
        match self.tx.try_send(QueueItem::Event(Box::new(event))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if let QueueItem::Event(event) = item {
                    warn!(
                        "event queue full, dropping {} for table {}",
                        event.kind, event.table_id
                    );
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event queue closed, dropping event");
            }
        }
    }

    /// Publish capability for tables.
    pub fn sink(self: &Arc<Self>) -> EventSink {
        let pipeline = Arc::clone(self);
        Arc::new(move |event| pipeline.publish(event))
    }

    /// Events dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events, drain the queue, and wait for the workers.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut workers = self.workers.lock().await;
        // One sentinel per worker, queued behind any buffered events so the
        // backlog drains first.
        for _ in 0..workers.len() {
            if self.tx.send(QueueItem::Shutdown).await.is_err() {
                break;
            }
        }
        for handle in workers.drain(..) {
            if let Err(err) = handle.await {
                warn!("event worker exited abnormally: {err}");
            }
        }
        info!("event pipeline stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    handlers: Arc<EventHandlers>,
) {
    debug!("event worker {worker_id} started");
    loop {
        let item = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        match item {
            Some(QueueItem::Event(event)) => handlers.handle(&event).await,
            Some(QueueItem::Shutdown) | None => break,
        }
    }
    debug!("event worker {worker_id} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SnapshotStore, StoreError};
    use crate::events::{Event, EventKind, EventPayload};
    use crate::snapshot::TableSnapshot;
    use crate::streams::StreamRegistry;
    use crate::table::{TableConfig, User};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct NoopStore;

    #[async_trait]
    impl SnapshotStore for NoopStore {
        async fn save_snapshot(&self, _snapshot: &TableSnapshot) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_table(&self, _table_id: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn snapshot_with_user(player_id: &str, seq: u64) -> TableSnapshot {
        TableSnapshot {
            id: "t1".to_string(),
            host_id: player_id.to_string(),
            config: TableConfig::default(),
            created_at: Utc::now(),
            users: vec![User {
                id: player_id.to_string(),
                name: player_id.to_string(),
                seat: 0,
                dcr_balance: 5000,
                ready: false,
                disconnected: false,
            }],
            game: None,
            seq,
            captured_at: Utc::now(),
        }
    }

    fn pipeline_with_streams() -> (Arc<EventPipeline>, Arc<StreamRegistry>) {
        let streams = Arc::new(StreamRegistry::new());
        let handlers = Arc::new(EventHandlers::new(
            Arc::clone(&streams),
            Arc::new(NoopStore),
        ));
        (EventPipeline::start(16, 2, handlers), streams)
    }

    #[tokio::test]
    async fn test_event_fans_out_with_payload_intact() {
        let (pipeline, streams) = pipeline_with_streams();
        let mut rx = streams.register_notifications("p1").await;

        pipeline.publish(Event::new(
            snapshot_with_user("p1", 1),
            EventPayload::BetMade {
                player_id: "p1".to_string(),
                amount: 40,
            },
        ));

        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("notification arrives")
            .expect("stream open");
        assert_eq!(notification.kind, EventKind::BetMade);
        assert_eq!(notification.player_id.as_deref(), Some("p1"));
        assert_eq!(notification.amount, Some(40));

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_buffered_events() {
        let (pipeline, streams) = pipeline_with_streams();
        let mut rx = streams.register_notifications("p1").await;

        for seq in 1..=5 {
            pipeline.publish(Event::new(
                snapshot_with_user("p1", seq),
                EventPayload::CheckMade {
                    player_id: "p1".to_string(),
                },
            ));
        }
        pipeline.shutdown().await;

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 5);
        assert_eq!(pipeline.dropped_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_dropped() {
        let (pipeline, streams) = pipeline_with_streams();
        let mut rx = streams.register_notifications("p1").await;
        pipeline.shutdown().await;

        pipeline.publish(Event::new(
            snapshot_with_user("p1", 1),
            EventPayload::GameEnded,
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mismatched_payload_is_skipped() {
        let (pipeline, streams) = pipeline_with_streams();
        let mut rx = streams.register_notifications("p1").await;

        let mut event = Event::new(snapshot_with_user("p1", 1), EventPayload::GameEnded);
        event.kind = EventKind::BetMade;
        pipeline.publish(event);
        pipeline.shutdown().await;

        assert!(rx.try_recv().is_err());
    }
}
