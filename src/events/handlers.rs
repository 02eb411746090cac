//! Per-event handlers run by the pipeline workers, in fixed order:
//! notification broadcaster, game-state broadcaster, persistence writer.
//!
//! Handlers only ever read the event's snapshot; they never reach back into
//! live table or game state, so they cannot deadlock against the engine.

use log::{error, warn};
use std::sync::Arc;

use super::{Event, EventKind};
use crate::db::SnapshotStore;
use crate::server::messages::{GameUpdate, Notification};
use crate::streams::StreamRegistry;

pub struct EventHandlers {
    streams: Arc<StreamRegistry>,
    store: Arc<dyn SnapshotStore>,
}

impl EventHandlers {
    pub fn new(streams: Arc<StreamRegistry>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { streams, store }
    }

    /// Run all three handlers for one event.
    pub async fn handle(&self, event: &Event) {
        if !event.payload_matches_kind() {
            warn!(
                "event {} for table {} carries a {} payload, skipping",
                event.kind,
                event.table_id,
                event.payload.kind()
            );
            return;
        }
        self.broadcast_notifications(event).await;
        self.broadcast_game_updates(event).await;
        self.persist(event).await;
    }

    /// Project the event to a wire notification and push it to every
    /// recipient's notification stream.
    async fn broadcast_notifications(&self, event: &Event) {
        let notification = Notification::from_event(event);
        for player_id in &event.recipients {
            self.streams
                .send_notification(player_id, notification.clone())
                .await;
        }
    }

    /// Rebuild one personalized game update per seated player and push it
    /// to their game stream.
    async fn broadcast_game_updates(&self, event: &Event) {
        for user in &event.snapshot.users {
            let update = GameUpdate::personalized(&event.snapshot, &user.id);
            self.streams
                .send_game_update(&event.table_id, &user.id, update)
                .await;
        }
    }

    /// Persist the snapshot (or drop the rows for a removed table).
    /// Failures are logged, not propagated: the in-memory state stands and
    /// the next event's snapshot supersedes this one.
    async fn persist(&self, event: &Event) {
        let result = match event.kind {
            EventKind::TableRemoved => self.store.delete_table(&event.table_id).await,
            _ => self.store.save_snapshot(&event.snapshot).await,
        };
        if let Err(err) = result {
            error!("failed to persist table {}: {err}", event.table_id);
        }
    }
}
