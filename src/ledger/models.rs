//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::entities::{Chips, PlayerId};

/// Account model: one balance per player id. Created on first credit,
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub player_id: PlayerId,
    pub display_name: String,
    pub balance: Chips,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transaction kind tags recorded with every ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdraw,
    BuyIn,
    Win,
    TipSend,
    TipRecv,
    Adjust,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Deposit => write!(f, "deposit"),
            EntryKind::Withdraw => write!(f, "withdraw"),
            EntryKind::BuyIn => write!(f, "buy_in"),
            EntryKind::Win => write!(f, "win"),
            EntryKind::TipSend => write!(f, "tip_send"),
            EntryKind::TipRecv => write!(f, "tip_recv"),
            EntryKind::Adjust => write!(f, "adjust"),
        }
    }
}

impl EntryKind {
    pub fn parse(s: &str) -> EntryKind {
        match s {
            "deposit" => EntryKind::Deposit,
            "withdraw" => EntryKind::Withdraw,
            "buy_in" => EntryKind::BuyIn,
            "win" => EntryKind::Win,
            "tip_send" => EntryKind::TipSend,
            "tip_recv" => EntryKind::TipRecv,
            _ => EntryKind::Adjust,
        }
    }
}

/// One append-only ledger entry. The account balance always equals the sum
/// of its entries' signed amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub player_id: PlayerId,
    /// Signed delta applied to the balance.
    pub amount: Chips,
    pub kind: EntryKind,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_round_trip() {
        for kind in [
            EntryKind::Deposit,
            EntryKind::Withdraw,
            EntryKind::BuyIn,
            EntryKind::Win,
            EntryKind::TipSend,
            EntryKind::TipRecv,
            EntryKind::Adjust,
        ] {
            assert_eq!(EntryKind::parse(&kind.to_string()), kind);
        }
    }

    #[test]
    fn test_unknown_kind_becomes_adjust() {
        assert_eq!(EntryKind::parse("mystery"), EntryKind::Adjust);
    }
}
