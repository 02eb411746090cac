//! Ledger manager: keyed balances with an append-only transaction log.
//!
//! Every balance mutation runs as one SQL transaction that updates the
//! account row and appends a log entry, so the balance always equals the
//! sum of the account's transactions, restart or not.

use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::errors::{LedgerError, LedgerResult};
use super::models::{Account, EntryKind, LedgerEntry};
use crate::game::entities::Chips;

/// Ledger manager
#[derive(Clone)]
pub struct LedgerManager {
    pool: SqlitePool,
}

impl LedgerManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch an account row.
    pub async fn get_account(&self, player_id: &str) -> LedgerResult<Account> {
        let row = sqlx::query(
            "SELECT player_id, display_name, balance, created_at, updated_at
             FROM accounts
             WHERE player_id = ?",
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(player_id.to_string()))?;

        Ok(Account {
            player_id: row.get("player_id"),
            display_name: row.get("display_name"),
            balance: row.get("balance"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Balance for a player; zero when no account exists yet.
    pub async fn balance_of(&self, player_id: &str) -> LedgerResult<Chips> {
        match self.get_account(player_id).await {
            Ok(account) => Ok(account.balance),
            Err(LedgerError::AccountNotFound(_)) => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Create the account row if missing, updating the display name either
    /// way. Balance is untouched.
    pub async fn ensure_account(&self, player_id: &str, display_name: &str) -> LedgerResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO accounts (player_id, display_name, balance, created_at, updated_at)
             VALUES (?, ?, 0, ?, ?)
             ON CONFLICT(player_id)
             DO UPDATE SET display_name = excluded.display_name, updated_at = excluded.updated_at",
        )
        .bind(player_id)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Credit an account, creating it on first use.
    pub async fn credit(
        &self,
        player_id: &str,
        amount: Chips,
        kind: EntryKind,
        description: Option<String>,
    ) -> LedgerResult<Chips> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut tx = self.pool.begin().await?;
        let new_balance = credit_in_tx(&mut tx, player_id, amount).await?;
        append_entry(&mut tx, player_id, amount, kind, description).await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    /// Debit an account. Fails without touching the store when the balance
    /// does not cover the amount.
    pub async fn debit(
        &self,
        player_id: &str,
        amount: Chips,
        kind: EntryKind,
        description: Option<String>,
    ) -> LedgerResult<Chips> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut tx = self.pool.begin().await?;
        let new_balance = debit_in_tx(&mut tx, player_id, amount).await?;
        append_entry(&mut tx, player_id, -amount, kind, description).await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    /// Apply a signed delta: positive credits, negative debits.
    pub async fn update_balance(
        &self,
        player_id: &str,
        delta: Chips,
        kind: EntryKind,
        description: Option<String>,
    ) -> LedgerResult<Chips> {
        if delta >= 0 {
            self.credit(player_id, delta, kind, description).await
        } else {
            self.debit(player_id, -delta, kind, description).await
        }
    }

    /// Move chips between two accounts atomically (tipping). Returns the
    /// sender's and recipient's new balances.
    pub async fn process_tip(
        &self,
        from: &str,
        to: &str,
        amount: Chips,
    ) -> LedgerResult<(Chips, Chips)> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut tx = self.pool.begin().await?;
        let from_balance = debit_in_tx(&mut tx, from, amount).await?;
        append_entry(
            &mut tx,
            from,
            -amount,
            EntryKind::TipSend,
            Some(format!("Tip to {to}")),
        )
        .await?;
        let to_balance = credit_in_tx(&mut tx, to, amount).await?;
        append_entry(
            &mut tx,
            to,
            amount,
            EntryKind::TipRecv,
            Some(format!("Tip from {from}")),
        )
        .await?;
        tx.commit().await?;
        Ok((from_balance, to_balance))
    }

    /// Most recent ledger entries for a player.
    pub async fn entries(&self, player_id: &str, limit: i64) -> LedgerResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT id, player_id, amount, kind, description, created_at
             FROM transactions
             WHERE player_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(player_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(|row| LedgerEntry {
                id: row.get("id"),
                player_id: row.get("player_id"),
                amount: row.get("amount"),
                kind: EntryKind::parse(&row.get::<String, _>("kind")),
                description: row.get("description"),
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect();

        Ok(entries)
    }

    /// Sum of all logged deltas for a player; equals the balance by
    /// construction.
    pub async fn sum_of_entries(&self, player_id: &str) -> LedgerResult<Chips> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM transactions WHERE player_id = ?",
        )
        .bind(player_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }
}

async fn credit_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    player_id: &str,
    amount: Chips,
) -> LedgerResult<Chips> {
    let now = Utc::now();
    let row = sqlx::query(
        "INSERT INTO accounts (player_id, display_name, balance, created_at, updated_at)
         VALUES (?, '', ?, ?, ?)
         ON CONFLICT(player_id)
         DO UPDATE SET balance = accounts.balance + excluded.balance,
                       updated_at = excluded.updated_at
         RETURNING balance",
    )
    .bind(player_id)
    .bind(amount)
    .bind(now)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.get("balance"))
}

async fn debit_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    player_id: &str,
    amount: Chips,
) -> LedgerResult<Chips> {
    // Guarded update: the balance check and the debit are one atomic
    // statement.
    let row = sqlx::query(
        "UPDATE accounts
         SET balance = balance - ?, updated_at = ?
         WHERE player_id = ? AND balance >= ?
         RETURNING balance",
    )
    .bind(amount)
    .bind(Utc::now())
    .bind(player_id)
    .bind(amount)
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some(row) => Ok(row.get("balance")),
        None => {
            let check = sqlx::query("SELECT balance FROM accounts WHERE player_id = ?")
                .bind(player_id)
                .fetch_optional(&mut **tx)
                .await?;
            match check {
                Some(row) => Err(LedgerError::InsufficientBalance {
                    available: row.get("balance"),
                    required: amount,
                }),
                None => Err(LedgerError::AccountNotFound(player_id.to_string())),
            }
        }
    }
}

async fn append_entry(
    tx: &mut Transaction<'_, Sqlite>,
    player_id: &str,
    amount: Chips,
    kind: EntryKind,
    description: Option<String>,
) -> LedgerResult<i64> {
    let row = sqlx::query(
        "INSERT INTO transactions (player_id, amount, kind, description, created_at)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(player_id)
    .bind(amount)
    .bind(kind.to_string())
    .bind(description)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.get("id"))
}
