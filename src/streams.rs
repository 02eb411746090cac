//! Stream registry: maps player ids to live notification streams and
//! (table, player) pairs to game-update streams.
//!
//! Sends are best-effort `try_send`s. A full buffer drops the message for
//! that stream only; a closed receiver deregisters the entry. The registry
//! never blocks a broadcaster on a slow client.

use log::debug;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::game::entities::{PlayerId, TableId};
use crate::server::messages::{GameUpdate, Notification};

/// Default per-stream buffer size.
const STREAM_BUFFER: usize = 64;

#[derive(Default)]
pub struct StreamRegistry {
    notifications: RwLock<HashMap<PlayerId, mpsc::Sender<Notification>>>,
    game_updates: RwLock<HashMap<(TableId, PlayerId), mpsc::Sender<GameUpdate>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a notification stream for a player, replacing any previous one.
    pub async fn register_notifications(&self, player_id: &str) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let mut map = self.notifications.write().await;
        map.insert(player_id.to_string(), tx);
        rx
    }

    pub async fn deregister_notifications(&self, player_id: &str) {
        let mut map = self.notifications.write().await;
        map.remove(player_id);
    }

    /// Open a game-update stream for a player at a table.
    pub async fn register_game_stream(
        &self,
        table_id: &str,
        player_id: &str,
    ) -> mpsc::Receiver<GameUpdate> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let mut map = self.game_updates.write().await;
        map.insert((table_id.to_string(), player_id.to_string()), tx);
        rx
    }

    pub async fn deregister_game_stream(&self, table_id: &str, player_id: &str) {
        let mut map = self.game_updates.write().await;
        map.remove(&(table_id.to_string(), player_id.to_string()));
    }

    /// Drop every stream belonging to a player (connection teardown).
    pub async fn deregister_player(&self, player_id: &str) {
        {
            let mut map = self.notifications.write().await;
            map.remove(player_id);
        }
        let mut map = self.game_updates.write().await;
        map.retain(|(_, pid), _| pid != player_id);
    }

    /// Push a notification to one player's stream, if registered.
    pub async fn send_notification(&self, player_id: &str, notification: Notification) {
        let closed = {
            let map = self.notifications.read().await;
            match map.get(player_id) {
                Some(tx) => match tx.try_send(notification) {
                    Ok(()) => false,
                    Err(TrySendError::Full(_)) => {
                        debug!("notification stream for {player_id} full, dropping");
                        false
                    }
                    Err(TrySendError::Closed(_)) => true,
                },
                None => false,
            }
        };
        if closed {
            debug!("notification stream for {player_id} closed, deregistering");
            self.deregister_notifications(player_id).await;
        }
    }

    /// Push a personalized game update to one player's stream, if
    /// registered.
    pub async fn send_game_update(&self, table_id: &str, player_id: &str, update: GameUpdate) {
        let key = (table_id.to_string(), player_id.to_string());
        let closed = {
            let map = self.game_updates.read().await;
            match map.get(&key) {
                Some(tx) => match tx.try_send(update) {
                    Ok(()) => false,
                    Err(TrySendError::Full(_)) => {
                        debug!("game stream for {player_id}@{table_id} full, dropping");
                        false
                    }
                    Err(TrySendError::Closed(_)) => true,
                },
                None => false,
            }
        };
        if closed {
            debug!("game stream for {player_id}@{table_id} closed, deregistering");
            self.deregister_game_stream(table_id, player_id).await;
        }
    }

    pub async fn notification_stream_count(&self) -> usize {
        self.notifications.read().await.len()
    }

    pub async fn game_stream_count(&self) -> usize {
        self.game_updates.read().await.len()
    }
}
