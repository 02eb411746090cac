//! Immutable value snapshots of table and game state.
//!
//! Snapshots are captured while the table and game locks are held and then
//! handed to the event pipeline, the stream broadcasters, and the
//! persistence writer. Every slice is deep-copied at capture; nothing in a
//! snapshot aliases live state, and a snapshot is never mutated after
//! capture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::entities::{Card, Chips, Phase, Player, PlayerId, SeatIndex, TableId};
use crate::table::{TableConfig, User};

/// Deep copy of one per-hand player record.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub seat: SeatIndex,
    pub balance: Chips,
    pub starting_balance: Chips,
    pub street_bet: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub is_dealer: bool,
    pub is_turn: bool,
    pub show_cards: bool,
    pub hole_cards: Vec<Card>,
    pub hand_desc: Option<String>,
}

impl From<&Player> for PlayerSnapshot {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            seat: player.seat,
            balance: player.balance,
            starting_balance: player.starting_balance,
            street_bet: player.street_bet,
            folded: player.folded,
            all_in: player.all_in,
            is_dealer: player.is_dealer,
            is_turn: player.is_turn,
            show_cards: player.show_cards,
            hole_cards: player.hole_cards.clone(),
            hand_desc: player.hand_desc.clone(),
        }
    }
}

/// Deep copy of the per-hand game state. Also the unit of persistence: the
/// table store writes these out and boot restore reads them back.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GameSnapshot {
    pub phase: Phase,
    /// Index into `players` (seat-sorted).
    pub dealer_idx: SeatIndex,
    /// Index into `players` of the player to act, if any.
    pub current_idx: Option<SeatIndex>,
    pub pot: Chips,
    pub current_bet: Chips,
    /// Hands dealt since the game started.
    pub round: u32,
    /// Betting rounds completed within the current hand.
    pub bet_round: u32,
    pub community: Vec<Card>,
    /// Undealt deck suffix, in draw order.
    pub deck: Vec<Card>,
    pub winners: Vec<PlayerId>,
    pub players: Vec<PlayerSnapshot>,
}

impl GameSnapshot {
    /// Id of the player whose turn it is, if the hand is waiting on one.
    pub fn current_player_id(&self) -> Option<&PlayerId> {
        self.current_idx
            .and_then(|idx| self.players.get(idx))
            .map(|p| &p.id)
    }

    /// Id of the dealer this hand.
    pub fn dealer_id(&self) -> Option<&PlayerId> {
        self.players.get(self.dealer_idx).map(|p| &p.id)
    }
}

/// Deep copy of a whole table: config, seats, and the running game if any.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub id: TableId,
    pub host_id: PlayerId,
    pub config: TableConfig,
    pub created_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub game: Option<GameSnapshot>,
    /// Per-table capture sequence, assigned under the table locks. Later
    /// captures carry strictly larger values, letting the persistence
    /// writer discard a stale snapshot that arrives after a newer one.
    pub seq: u64,
    pub captured_at: DateTime<Utc>,
}

impl TableSnapshot {
    /// All seated player ids, in seat order.
    pub fn user_ids(&self) -> Vec<PlayerId> {
        self.users.iter().map(|u| u.id.clone()).collect()
    }

    pub fn user(&self, player_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == player_id)
    }
}
