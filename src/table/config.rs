//! Table configuration models.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::entities::Chips;

/// Players needed before a 52-card deck runs out (2 hole cards each plus a
/// full board).
pub const MAX_SEATS: usize = 23;

/// Table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Small blind amount
    pub small_blind: Chips,

    /// Big blind amount
    pub big_blind: Chips,

    /// Minimum players required to start a game
    pub min_players: usize,

    /// Maximum seats
    pub max_players: usize,

    /// DCR deducted from the account balance when sitting down
    pub buy_in: Chips,

    /// Minimum account balance required to sit
    pub min_balance: Chips,

    /// Chips handed to each player when the game starts
    pub starting_chips: Chips,

    /// Per-turn wall-clock budget before the engine auto-acts
    pub time_bank: Duration,

    /// Delay between full readiness (or a showdown) and the next deal
    pub auto_start_delay: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            small_blind: 5,
            big_blind: 10,
            min_players: 2,
            max_players: 9,
            buy_in: 100,
            min_balance: 0,
            starting_chips: 1000,
            time_bank: Duration::from_secs(30),
            auto_start_delay: Duration::from_millis(3000),
        }
    }
}

impl TableConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.small_blind <= 0 {
            return Err("small blind must be positive".to_string());
        }
        if self.big_blind <= self.small_blind {
            return Err("big blind must be greater than small blind".to_string());
        }
        if self.min_players < 2 {
            return Err("min players must be at least 2".to_string());
        }
        if self.max_players < self.min_players {
            return Err("max players must be at least min players".to_string());
        }
        if self.max_players > MAX_SEATS {
            return Err(format!("max players must be at most {MAX_SEATS}"));
        }
        if self.buy_in < 0 {
            return Err("buy-in cannot be negative".to_string());
        }
        if self.min_balance < 0 {
            return Err("min balance cannot be negative".to_string());
        }
        if self.starting_chips <= self.big_blind {
            return Err("starting chips must exceed the big blind".to_string());
        }
        if self.time_bank.is_zero() {
            return Err("time bank must be non-zero".to_string());
        }
        Ok(())
    }
}
