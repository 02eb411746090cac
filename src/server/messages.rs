//! Request/response shapes and the server-push wire types.
//!
//! These are the only types that cross the facade boundary; the transport
//! layer serializes them however it likes. `GameUpdate` is always built
//! from a snapshot through the per-viewer visibility projection, never from
//! live state.

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::events::{Event, EventKind, EventPayload};
use crate::game::engine::ShowdownSummary;
use crate::game::entities::{Card, Chips, Phase, PlayerId, SeatIndex, TableId};
use crate::snapshot::{PlayerSnapshot, TableSnapshot};
use crate::table::TableConfig;

/// Parameters for creating a table. Optional fields fall back to the
/// service defaults.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CreateTableRequest {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub min_players: usize,
    pub max_players: usize,
    pub buy_in: Chips,
    pub min_balance: Chips,
    pub starting_chips: Option<Chips>,
    pub time_bank_secs: Option<u64>,
    pub auto_start_ms: Option<u64>,
}

impl CreateTableRequest {
    /// Resolve into a table configuration using service defaults for the
    /// unset options.
    pub fn into_config(self, defaults: &ServerConfig) -> TableConfig {
        TableConfig {
            small_blind: self.small_blind,
            big_blind: self.big_blind,
            min_players: self.min_players,
            max_players: self.max_players,
            buy_in: self.buy_in,
            min_balance: self.min_balance,
            starting_chips: self
                .starting_chips
                .unwrap_or(defaults.default_starting_chips),
            time_bank: self
                .time_bank_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or(defaults.default_time_bank),
            auto_start_delay: self
                .auto_start_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or_else(|| std::time::Duration::from_millis(3000)),
        }
    }
}

/// Join outcome, including the post-deduction account balance.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JoinTableResponse {
    pub success: bool,
    pub message: String,
    pub new_balance: Chips,
}

/// Generic success/message response for leave and betting operations.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OpResponse {
    pub success: bool,
    pub message: String,
}

impl OpResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Public lobby listing entry.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TableSummary {
    pub id: TableId,
    pub host_id: PlayerId,
    pub player_count: usize,
    pub min_players: usize,
    pub max_players: usize,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub buy_in: Chips,
    pub game_running: bool,
    pub phase: Phase,
}

impl TableSummary {
    pub fn from_snapshot(snapshot: &TableSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            host_id: snapshot.host_id.clone(),
            player_count: snapshot.users.len(),
            min_players: snapshot.config.min_players,
            max_players: snapshot.config.max_players,
            small_blind: snapshot.config.small_blind,
            big_blind: snapshot.config.big_blind,
            buy_in: snapshot.config.buy_in,
            game_running: snapshot.game.is_some(),
            phase: snapshot
                .game
                .as_ref()
                .map(|g| g.phase)
                .unwrap_or(Phase::Waiting),
        }
    }
}

/// Small wire notification pushed on every event.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Notification {
    pub kind: EventKind,
    pub table_id: TableId,
    pub player_id: Option<PlayerId>,
    pub amount: Option<Chips>,
    pub message: String,
    pub showdown: Option<ShowdownSummary>,
}

impl Notification {
    /// Project an event down to its notification form.
    pub fn from_event(event: &Event) -> Self {
        let (player_id, amount, message, showdown) = match &event.payload {
            EventPayload::TableCreated { host_id } => (
                Some(host_id.clone()),
                None,
                format!("Table created by {host_id}"),
                None,
            ),
            EventPayload::TableRemoved => (None, None, "Table closed".to_string(), None),
            EventPayload::PlayerJoined { player_id, seat } => (
                Some(player_id.clone()),
                None,
                format!("{player_id} joined at seat {seat}"),
                None,
            ),
            EventPayload::PlayerLeft {
                player_id,
                new_host,
            } => {
                let message = match new_host {
                    Some(host) => format!("{player_id} left the table, {host} is the new host"),
                    None => format!("{player_id} left the table"),
                };
                (Some(player_id.clone()), None, message, None)
            }
            EventPayload::PlayerReady { player_id, ready } => {
                let message = if *ready {
                    format!("{player_id} is ready")
                } else {
                    format!("{player_id} is no longer ready")
                };
                (Some(player_id.clone()), None, message, None)
            }
            EventPayload::GameStarted { dealer } => (
                Some(dealer.clone()),
                None,
                format!("Game started, {dealer} deals"),
                None,
            ),
            EventPayload::NewHandStarted { dealer } => (
                Some(dealer.clone()),
                None,
                format!("New hand, {dealer} deals"),
                None,
            ),
            EventPayload::BetMade { player_id, amount } => (
                Some(player_id.clone()),
                Some(*amount),
                format!("{player_id} bet {amount}"),
                None,
            ),
            EventPayload::CallMade { player_id, amount } => (
                Some(player_id.clone()),
                Some(*amount),
                format!("{player_id} called {amount}"),
                None,
            ),
            EventPayload::CheckMade { player_id } => (
                Some(player_id.clone()),
                None,
                format!("{player_id} checked"),
                None,
            ),
            EventPayload::PlayerFolded { player_id } => (
                Some(player_id.clone()),
                None,
                format!("{player_id} folded"),
                None,
            ),
            EventPayload::PlayerAllIn { player_id, amount } => (
                Some(player_id.clone()),
                Some(*amount),
                format!("{player_id} is all-in for {amount}"),
                None,
            ),
            EventPayload::ShowdownResult { summary } => (
                summary.winners.first().cloned(),
                Some(summary.pot),
                format!(
                    "{} won the {} chip pot",
                    summary.winners.join(", "),
                    summary.pot
                ),
                Some(summary.clone()),
            ),
            EventPayload::GameEnded => (None, None, "Game ended".to_string(), None),
        };
        Self {
            kind: event.kind,
            table_id: event.table_id.clone(),
            player_id,
            amount,
            message,
            showdown,
        }
    }
}

/// One player's entry in a [`GameUpdate`], post visibility projection.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GamePlayerView {
    pub id: PlayerId,
    pub name: String,
    pub seat: SeatIndex,
    pub ready: bool,
    pub disconnected: bool,
    pub chips: Chips,
    pub street_bet: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub is_dealer: bool,
    pub is_turn: bool,
    /// Empty unless visible to the viewer.
    pub hole_cards: Vec<Card>,
    pub hand_description: Option<String>,
}

/// Personalized table state pushed over the game stream.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GameUpdate {
    pub table_id: TableId,
    pub viewer_id: PlayerId,
    pub host_id: PlayerId,
    pub game_running: bool,
    pub phase: Phase,
    pub dealer_id: Option<PlayerId>,
    pub current_player_id: Option<PlayerId>,
    pub your_turn: bool,
    pub pot: Chips,
    pub current_bet: Chips,
    pub community: Vec<Card>,
    pub winners: Vec<PlayerId>,
    pub players: Vec<GamePlayerView>,
}

impl GameUpdate {
    /// Build the update one viewer is allowed to see.
    ///
    /// Hole cards are visible only to their owner during active streets; at
    /// showdown every surviving player's cards and hand description are
    /// visible to all; during the deal nothing is visible to anyone. A
    /// player who elected to show keeps their cards face up.
    pub fn personalized(snapshot: &TableSnapshot, viewer_id: &str) -> Self {
        let game = snapshot.game.as_ref();
        let phase = game.map(|g| g.phase).unwrap_or(Phase::Waiting);
        let current_player_id = game.and_then(|g| g.current_player_id().cloned());

        let players = snapshot
            .users
            .iter()
            .map(|user| {
                let hand = game.and_then(|g| g.players.iter().find(|p| p.id == user.id));
                match hand {
                    Some(hand) => {
                        let show_cards = hole_cards_visible(phase, hand, viewer_id);
                        let show_desc = hand.id == viewer_id
                            || (phase == Phase::Showdown && !hand.folded);
                        GamePlayerView {
                            id: user.id.clone(),
                            name: user.name.clone(),
                            seat: user.seat,
                            ready: user.ready,
                            disconnected: user.disconnected,
                            chips: hand.balance,
                            street_bet: hand.street_bet,
                            folded: hand.folded,
                            all_in: hand.all_in,
                            is_dealer: hand.is_dealer,
                            is_turn: hand.is_turn,
                            hole_cards: if show_cards {
                                hand.hole_cards.clone()
                            } else {
                                Vec::new()
                            },
                            hand_description: if show_desc {
                                hand.hand_desc.clone()
                            } else {
                                None
                            },
                        }
                    }
                    None => GamePlayerView {
                        id: user.id.clone(),
                        name: user.name.clone(),
                        seat: user.seat,
                        ready: user.ready,
                        disconnected: user.disconnected,
                        chips: 0,
                        street_bet: 0,
                        folded: false,
                        all_in: false,
                        is_dealer: false,
                        is_turn: false,
                        hole_cards: Vec::new(),
                        hand_description: None,
                    },
                }
            })
            .collect();

        Self {
            table_id: snapshot.id.clone(),
            viewer_id: viewer_id.to_string(),
            host_id: snapshot.host_id.clone(),
            game_running: game.is_some(),
            phase,
            dealer_id: game.and_then(|g| g.dealer_id().cloned()),
            current_player_id: current_player_id.clone(),
            your_turn: current_player_id.as_deref() == Some(viewer_id),
            // Displayed pot includes the live street's commitments.
            pot: game
                .map(|g| g.pot + g.players.iter().map(|p| p.street_bet).sum::<Chips>())
                .unwrap_or(0),
            current_bet: game.map(|g| g.current_bet).unwrap_or(0),
            community: game.map(|g| g.community.clone()).unwrap_or_default(),
            winners: game.map(|g| g.winners.clone()).unwrap_or_default(),
            players,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&GamePlayerView> {
        self.players.iter().find(|p| p.id == player_id)
    }
}

/// Card visibility rule for one player's hole cards.
fn hole_cards_visible(phase: Phase, hand: &PlayerSnapshot, viewer_id: &str) -> bool {
    match phase {
        // Hidden from everyone, the owner included, until the deal settles.
        Phase::NewHandDealing => false,
        Phase::Showdown => hand.id == viewer_id || !hand.folded || hand.show_cards,
        _ => hand.id == viewer_id || hand.show_cards,
    }
}
