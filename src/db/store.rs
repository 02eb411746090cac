//! Atomic table-state persistence and boot-time restore.
//!
//! One snapshot write replaces the table row and the full set of player
//! rows in a single transaction; a crash between any two events leaves the
//! store at the previous snapshot, never in between. Saves for the same
//! table are serialized by a per-table mutex; different tables write in
//! parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::StoreError;
use crate::game::entities::{Card, PlayerId, TableId};
use crate::snapshot::{GameSnapshot, PlayerSnapshot, TableSnapshot};
use crate::table::{TableConfig, User};

/// Seam between the event pipeline and durable storage. Tests substitute a
/// no-op implementation.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Atomically persist one table snapshot (table row + player rows).
    async fn save_snapshot(&self, snapshot: &TableSnapshot) -> Result<(), StoreError>;

    /// Remove a table and its player rows.
    async fn delete_table(&self, table_id: &str) -> Result<(), StoreError>;
}

/// SQLite-backed table store.
pub struct SqliteTableStore {
    pool: SqlitePool,
    /// Per-table save serialization.
    save_locks: Mutex<HashMap<TableId, Arc<Mutex<()>>>>,
    /// Highest snapshot sequence persisted per table this process.
    last_seq: Mutex<HashMap<TableId, u64>>,
}

impl SqliteTableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            save_locks: Mutex::new(HashMap::new()),
            last_seq: Mutex::new(HashMap::new()),
        }
    }

    async fn save_lock(&self, table_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.save_locks.lock().await;
        locks
            .entry(table_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// All persisted table ids.
    pub async fn load_table_ids(&self) -> Result<Vec<TableId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM table_states ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    /// Load one table's persisted snapshot: config, seats, and the in-hand
    /// game state if a game was running.
    pub async fn load_snapshot(&self, table_id: &str) -> Result<TableSnapshot, StoreError> {
        let table_row = sqlx::query("SELECT * FROM table_states WHERE id = ?")
            .bind(table_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))?;

        let player_rows = sqlx::query(
            "SELECT * FROM player_states WHERE table_id = ? ORDER BY seat ASC",
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await?;

        let config = TableConfig {
            small_blind: table_row.get("small_blind"),
            big_blind: table_row.get("big_blind"),
            min_players: table_row.get::<i64, _>("min_players") as usize,
            max_players: table_row.get::<i64, _>("max_players") as usize,
            buy_in: table_row.get("buy_in"),
            min_balance: table_row.get("min_balance"),
            starting_chips: table_row.get("starting_chips"),
            time_bank: Duration::from_millis(table_row.get::<i64, _>("time_bank_ms") as u64),
            auto_start_delay: Duration::from_millis(
                table_row.get::<i64, _>("auto_start_ms") as u64,
            ),
        };

        let mut users: Vec<User> = Vec::with_capacity(player_rows.len());
        let mut players: Vec<PlayerSnapshot> = Vec::new();
        for row in &player_rows {
            users.push(User {
                id: row.get("player_id"),
                name: row.get("display_name"),
                seat: row.get::<i64, _>("seat") as usize,
                dcr_balance: row.get("dcr_balance"),
                ready: row.get("ready"),
                disconnected: row.get("disconnected"),
            });
            if row.get::<bool, _>("in_hand") {
                players.push(PlayerSnapshot {
                    id: row.get("player_id"),
                    seat: row.get::<i64, _>("seat") as usize,
                    balance: row.get("balance"),
                    starting_balance: row.get("starting_balance"),
                    street_bet: row.get("street_bet"),
                    folded: row.get("folded"),
                    all_in: row.get("all_in"),
                    is_dealer: row.get("is_dealer"),
                    is_turn: row.get("is_turn"),
                    show_cards: row.get("show_cards"),
                    hole_cards: from_json(&row.get::<String, _>("hole_cards"))?,
                    hand_desc: row.get("hand_desc"),
                });
            }
        }

        let game = if table_row.get::<bool, _>("game_started") {
            let phase_tag: String = table_row.get("phase");
            let phase = crate::game::entities::Phase::parse(&phase_tag)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown phase {phase_tag:?}")))?;
            let community: Vec<Card> = from_json(&table_row.get::<String, _>("community_cards"))?;
            let deck: Vec<Card> = from_json(&table_row.get::<String, _>("deck"))?;
            let winners: Vec<PlayerId> = from_json(&table_row.get::<String, _>("winners"))?;
            Some(GameSnapshot {
                phase,
                dealer_idx: table_row.get::<i64, _>("dealer_idx") as usize,
                current_idx: table_row
                    .get::<Option<i64>, _>("current_idx")
                    .map(|idx| idx as usize),
                pot: table_row.get("pot"),
                current_bet: table_row.get("current_bet"),
                round: table_row.get::<i64, _>("round") as u32,
                bet_round: table_row.get::<i64, _>("bet_round") as u32,
                community,
                deck,
                winners,
                players,
            })
        } else {
            None
        };

        Ok(TableSnapshot {
            id: table_row.get("id"),
            host_id: table_row.get("host_id"),
            config,
            created_at: table_row.get::<DateTime<Utc>, _>("created_at"),
            users,
            game,
            // Sequence numbering restarts with the process.
            seq: 0,
            captured_at: table_row.get::<DateTime<Utc>, _>("last_action"),
        })
    }
}

#[async_trait]
impl SnapshotStore for SqliteTableStore {
    async fn save_snapshot(&self, snapshot: &TableSnapshot) -> Result<(), StoreError> {
        let lock = self.save_lock(&snapshot.id).await;
        let _guard = lock.lock().await;

        // Workers may hand over snapshots out of order; only the latest
        // state matters.
        {
            let mut last_seq = self.last_seq.lock().await;
            let last = last_seq.entry(snapshot.id.clone()).or_insert(0);
            if snapshot.seq <= *last && *last != 0 {
                debug!(
                    "skipping stale snapshot seq {} for table {} (latest {})",
                    snapshot.seq, snapshot.id, last
                );
                return Ok(());
            }
            *last = snapshot.seq;
        }

        let game = snapshot.game.as_ref();
        let community = to_json(&game.map(|g| g.community.clone()).unwrap_or_default())?;
        let deck = to_json(&game.map(|g| g.deck.clone()).unwrap_or_default())?;
        let winners = to_json(&game.map(|g| g.winners.clone()).unwrap_or_default())?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO table_states (
                id, host_id, small_blind, big_blind, min_players, max_players,
                buy_in, min_balance, starting_chips, time_bank_ms, auto_start_ms,
                game_started, phase, dealer_idx, current_idx, current_bet, pot,
                round, bet_round, community_cards, deck, winners, created_at,
                last_action
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                host_id = excluded.host_id,
                small_blind = excluded.small_blind,
                big_blind = excluded.big_blind,
                min_players = excluded.min_players,
                max_players = excluded.max_players,
                buy_in = excluded.buy_in,
                min_balance = excluded.min_balance,
                starting_chips = excluded.starting_chips,
                time_bank_ms = excluded.time_bank_ms,
                auto_start_ms = excluded.auto_start_ms,
                game_started = excluded.game_started,
                phase = excluded.phase,
                dealer_idx = excluded.dealer_idx,
                current_idx = excluded.current_idx,
                current_bet = excluded.current_bet,
                pot = excluded.pot,
                round = excluded.round,
                bet_round = excluded.bet_round,
                community_cards = excluded.community_cards,
                deck = excluded.deck,
                winners = excluded.winners,
                last_action = excluded.last_action",
        )
        .bind(&snapshot.id)
        .bind(&snapshot.host_id)
        .bind(snapshot.config.small_blind)
        .bind(snapshot.config.big_blind)
        .bind(snapshot.config.min_players as i64)
        .bind(snapshot.config.max_players as i64)
        .bind(snapshot.config.buy_in)
        .bind(snapshot.config.min_balance)
        .bind(snapshot.config.starting_chips)
        .bind(snapshot.config.time_bank.as_millis() as i64)
        .bind(snapshot.config.auto_start_delay.as_millis() as i64)
        .bind(game.is_some())
        .bind(game.map(|g| g.phase.as_str()).unwrap_or("waiting"))
        .bind(game.map(|g| g.dealer_idx as i64).unwrap_or(0))
        .bind(game.and_then(|g| g.current_idx.map(|idx| idx as i64)))
        .bind(game.map(|g| g.current_bet).unwrap_or(0))
        .bind(game.map(|g| g.pot).unwrap_or(0))
        .bind(game.map(|g| g.round as i64).unwrap_or(0))
        .bind(game.map(|g| g.bet_round as i64).unwrap_or(0))
        .bind(community)
        .bind(deck)
        .bind(winners)
        .bind(snapshot.created_at)
        .bind(snapshot.captured_at)
        .execute(&mut *tx)
        .await?;

        // Replace the player-row set wholesale; the transaction keeps the
        // old rows visible until commit.
        sqlx::query("DELETE FROM player_states WHERE table_id = ?")
            .bind(&snapshot.id)
            .execute(&mut *tx)
            .await?;

        for user in &snapshot.users {
            let hand = game.and_then(|g| g.players.iter().find(|p| p.id == user.id));
            sqlx::query(
                "INSERT INTO player_states (
                    table_id, player_id, display_name, seat, dcr_balance, ready,
                    disconnected, in_hand, balance, starting_balance, street_bet,
                    folded, all_in, is_dealer, is_turn, show_cards, hole_cards,
                    hand_desc
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&snapshot.id)
            .bind(&user.id)
            .bind(&user.name)
            .bind(user.seat as i64)
            .bind(user.dcr_balance)
            .bind(user.ready)
            .bind(user.disconnected)
            .bind(hand.is_some())
            .bind(hand.map(|p| p.balance).unwrap_or(0))
            .bind(hand.map(|p| p.starting_balance).unwrap_or(0))
            .bind(hand.map(|p| p.street_bet).unwrap_or(0))
            .bind(hand.map(|p| p.folded).unwrap_or(false))
            .bind(hand.map(|p| p.all_in).unwrap_or(false))
            .bind(hand.map(|p| p.is_dealer).unwrap_or(false))
            .bind(hand.map(|p| p.is_turn).unwrap_or(false))
            .bind(hand.map(|p| p.show_cards).unwrap_or(false))
            .bind(to_json(&hand.map(|p| p.hole_cards.clone()).unwrap_or_default())?)
            .bind(hand.and_then(|p| p.hand_desc.clone()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            "persisted table {} ({} players, game: {})",
            snapshot.id,
            snapshot.users.len(),
            game.is_some()
        );
        Ok(())
    }

    async fn delete_table(&self, table_id: &str) -> Result<(), StoreError> {
        let lock = self.save_lock(table_id).await;
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM player_states WHERE table_id = ?")
            .bind(table_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM table_states WHERE id = ?")
            .bind(table_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut locks = self.save_locks.lock().await;
        locks.remove(table_id);
        drop(locks);
        let mut last_seq = self.last_seq.lock().await;
        last_seq.remove(table_id);
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|err| StoreError::Corrupt(err.to_string()))
}
