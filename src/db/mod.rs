//! Database module providing the SQLite connection pool and schema.
//!
//! Two logical stores share one database file: the balance ledger
//! (`accounts` + `transactions`) and the game state store (`table_states` +
//! `player_states`).

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub mod store;

pub use store::{SnapshotStore, SqliteTableStore};

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row failed to decode (bad JSON, unknown phase tag).
    #[error("corrupt stored state: {0}")]
    Corrupt(String),

    /// Table row missing
    #[error("table {0} not found")]
    TableNotFound(String),
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        player_id    TEXT PRIMARY KEY,
        display_name TEXT NOT NULL DEFAULT '',
        balance      INTEGER NOT NULL DEFAULT 0,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id   TEXT NOT NULL,
        amount      INTEGER NOT NULL,
        kind        TEXT NOT NULL,
        description TEXT,
        created_at  TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_transactions_player ON transactions (player_id)",
    "CREATE TABLE IF NOT EXISTS table_states (
        id              TEXT PRIMARY KEY,
        host_id         TEXT NOT NULL,
        small_blind     INTEGER NOT NULL,
        big_blind       INTEGER NOT NULL,
        min_players     INTEGER NOT NULL,
        max_players     INTEGER NOT NULL,
        buy_in          INTEGER NOT NULL,
        min_balance     INTEGER NOT NULL,
        starting_chips  INTEGER NOT NULL,
        time_bank_ms    INTEGER NOT NULL,
        auto_start_ms   INTEGER NOT NULL,
        game_started    INTEGER NOT NULL DEFAULT 0,
        phase           TEXT NOT NULL DEFAULT 'waiting',
        dealer_idx      INTEGER NOT NULL DEFAULT 0,
        current_idx     INTEGER,
        current_bet     INTEGER NOT NULL DEFAULT 0,
        pot             INTEGER NOT NULL DEFAULT 0,
        round           INTEGER NOT NULL DEFAULT 0,
        bet_round       INTEGER NOT NULL DEFAULT 0,
        community_cards TEXT NOT NULL DEFAULT '[]',
        deck            TEXT NOT NULL DEFAULT '[]',
        winners         TEXT NOT NULL DEFAULT '[]',
        created_at      TEXT NOT NULL,
        last_action     TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS player_states (
        table_id         TEXT NOT NULL,
        player_id        TEXT NOT NULL,
        display_name     TEXT NOT NULL DEFAULT '',
        seat             INTEGER NOT NULL,
        dcr_balance      INTEGER NOT NULL DEFAULT 0,
        ready            INTEGER NOT NULL DEFAULT 0,
        disconnected     INTEGER NOT NULL DEFAULT 0,
        in_hand          INTEGER NOT NULL DEFAULT 0,
        balance          INTEGER NOT NULL DEFAULT 0,
        starting_balance INTEGER NOT NULL DEFAULT 0,
        street_bet       INTEGER NOT NULL DEFAULT 0,
        folded           INTEGER NOT NULL DEFAULT 0,
        all_in           INTEGER NOT NULL DEFAULT 0,
        is_dealer        INTEGER NOT NULL DEFAULT 0,
        is_turn          INTEGER NOT NULL DEFAULT 0,
        show_cards       INTEGER NOT NULL DEFAULT 0,
        hole_cards       TEXT NOT NULL DEFAULT '[]',
        hand_desc        TEXT,
        PRIMARY KEY (table_id, player_id)
    )",
];

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at `path` and apply the
    /// schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
