//! Core game entities: cards, the deck, phases, and per-hand player records.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque player identifier, assigned by the surrounding transport layer.
pub type PlayerId = String;

/// Opaque table identifier.
pub type TableId = String;

/// Type alias for chip amounts. Signed so that ledger deltas and chip
/// balances share one representation.
pub type Chips = i64;

/// Type alias for seat positions at a table.
pub type SeatIndex = usize;

/// Placeholder for card values (2 = deuce .. 14 = ace).
pub type Value = u8;

pub const MIN_CARD_VALUE: Value = 2;
pub const MAX_CARD_VALUE: Value = 14;

/// Number of hole cards dealt to each player.
pub const HOLE_CARDS: usize = 2;

/// Number of community cards on a full board.
pub const BOARD_SIZE: usize = 5;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

/// A card is a tuple of a value (2u8 ... ace=14u8) and a suit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl Card {
    /// Whether the value falls inside the playable range.
    pub fn is_valid(&self) -> bool {
        (MIN_CARD_VALUE..=MAX_CARD_VALUE).contains(&self.0)
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            14 => "A",
            13 => "K",
            12 => "Q",
            11 => "J",
            v => &v.to_string(),
        };
        write!(f, "{value}{}", self.1)
    }
}

/// Human-readable singular name for a card value ("Ace", "Ten").
pub fn value_name(value: Value) -> &'static str {
    match value {
        2 => "Two",
        3 => "Three",
        4 => "Four",
        5 => "Five",
        6 => "Six",
        7 => "Seven",
        8 => "Eight",
        9 => "Nine",
        10 => "Ten",
        11 => "Jack",
        12 => "Queen",
        13 => "King",
        14 => "Ace",
        _ => "Unknown",
    }
}

/// Plural name for a card value ("Aces", "Tens").
pub fn value_name_plural(value: Value) -> String {
    match value {
        6 => "Sixes".to_string(),
        v => format!("{}s", value_name(v)),
    }
}

/// A shuffled deck dealt from the top. The undealt suffix is exposed for
/// persistence so a mid-hand deck can be restored without reshuffling.
#[derive(Clone, Debug)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Build an ordered 52-card deck. Call [`Deck::shuffle`] before dealing.
    pub fn new() -> Self {
        let mut cards = Vec::with_capacity(52);
        for value in MIN_CARD_VALUE..=MAX_CARD_VALUE {
            for suit in Suit::ALL {
                cards.push(Card(value, suit));
            }
        }
        Self { cards }
    }

    /// Restore a deck from a persisted remaining-card list.
    pub fn from_remaining(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    /// Uniform Fisher-Yates shuffle driven by the OS-seeded ChaCha12 CSPRNG.
    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut rand::rng());
    }

    /// Deal the top card. `None` once the deck is exhausted.
    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    /// The undealt cards, in draw order from the bottom up.
    pub fn remaining(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

/// Phases of a single hand, from seating to showdown.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    NewHandDealing,
    PreFlop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl Phase {
    /// Whether a hand is in progress (cards out, pot live).
    pub fn in_hand(&self) -> bool {
        !matches!(self, Phase::Waiting | Phase::Showdown)
    }

    /// Whether the phase is a betting street.
    pub fn is_street(&self) -> bool {
        matches!(self, Phase::PreFlop | Phase::Flop | Phase::Turn | Phase::River)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::NewHandDealing => "new_hand_dealing",
            Phase::PreFlop => "pre_flop",
            Phase::Flop => "flop",
            Phase::Turn => "turn",
            Phase::River => "river",
            Phase::Showdown => "showdown",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s {
            "waiting" => Some(Phase::Waiting),
            "new_hand_dealing" => Some(Phase::NewHandDealing),
            "pre_flop" => Some(Phase::PreFlop),
            "flop" => Some(Phase::Flop),
            "turn" => Some(Phase::Turn),
            "river" => Some(Phase::River),
            "showdown" => Some(Phase::Showdown),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A betting-turn action as submitted by a player.
///
/// `Bet(amount)` names the total street commitment the player wants to
/// reach; the engine resolves it into a call, raise, or all-in.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PlayerAction {
    Fold,
    Check,
    Call,
    Bet(Chips),
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Fold => "folds".to_string(),
            Self::Check => "checks".to_string(),
            Self::Call => "calls".to_string(),
            Self::Bet(amount) => format!("bets {amount}"),
        };
        write!(f, "{repr}")
    }
}

/// Per-hand player record. Owned by the game engine; downstream consumers
/// see it only through snapshots.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: PlayerId,
    pub seat: SeatIndex,
    /// Chips behind, this hand.
    pub balance: Chips,
    /// Balance at the moment the hand was dealt.
    pub starting_balance: Chips,
    /// Chips committed to the current street.
    pub street_bet: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub is_dealer: bool,
    pub is_turn: bool,
    /// Has acted since the most recent raise this street.
    pub acted: bool,
    /// Voluntary reveal flag; widens the visibility projection.
    pub show_cards: bool,
    pub hole_cards: Vec<Card>,
    /// Populated at showdown for surviving players.
    pub hand_desc: Option<String>,
}

impl Player {
    pub fn new(id: PlayerId, seat: SeatIndex, balance: Chips) -> Self {
        Self {
            id,
            seat,
            balance,
            starting_balance: balance,
            street_bet: 0,
            folded: false,
            all_in: false,
            is_dealer: false,
            is_turn: false,
            acted: false,
            show_cards: false,
            hole_cards: Vec::with_capacity(HOLE_CARDS),
            hand_desc: None,
        }
    }

    /// Whether this player can still act this street.
    pub fn can_act(&self) -> bool {
        !self.folded && !self.all_in
    }

    /// Reset per-hand fields ahead of a new deal.
    pub fn reset_for_hand(&mut self) {
        self.starting_balance = self.balance;
        self.street_bet = 0;
        self.folded = false;
        self.all_in = false;
        self.is_dealer = false;
        self.is_turn = false;
        self.acted = false;
        self.show_cards = false;
        self.hole_cards.clear();
        self.hand_desc = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_has_52_unique_cards() {
        let deck = Deck::new();
        assert_eq!(deck.len(), 52);
        let unique: std::collections::HashSet<Card> = deck.remaining().iter().copied().collect();
        assert_eq!(unique.len(), 52);
    }

    #[test]
    fn test_deck_shuffle_preserves_cards() {
        let mut deck = Deck::new();
        let before: std::collections::HashSet<Card> = deck.remaining().iter().copied().collect();
        deck.shuffle();
        let after: std::collections::HashSet<Card> = deck.remaining().iter().copied().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_deck_draw_reduces_remaining() {
        let mut deck = Deck::new();
        let top = *deck.remaining().last().unwrap();
        let drawn = deck.draw().unwrap();
        assert_eq!(top, drawn);
        assert_eq!(deck.len(), 51);
        assert!(!deck.remaining().contains(&drawn));
    }

    #[test]
    fn test_deck_round_trips_through_remaining() {
        let mut deck = Deck::new();
        deck.shuffle();
        deck.draw();
        deck.draw();
        let saved: Vec<Card> = deck.remaining().to_vec();
        let mut restored = Deck::from_remaining(saved.clone());
        assert_eq!(restored.remaining(), saved.as_slice());
        assert_eq!(restored.draw(), Some(saved[saved.len() - 1]));
    }

    #[test]
    fn test_card_serde_round_trip() {
        let cards = vec![Card(14, Suit::Spade), Card(2, Suit::Heart), Card(10, Suit::Club)];
        let json = serde_json::to_string(&cards).unwrap();
        let back: Vec<Card> = serde_json::from_str(&json).unwrap();
        assert_eq!(cards, back);
    }

    #[test]
    fn test_card_display() {
        assert_eq!(Card(14, Suit::Spade).to_string(), "A♠");
        assert_eq!(Card(10, Suit::Heart).to_string(), "10♥");
        assert_eq!(Card(2, Suit::Club).to_string(), "2♣");
    }

    #[test]
    fn test_card_validity() {
        assert!(Card(2, Suit::Club).is_valid());
        assert!(Card(14, Suit::Club).is_valid());
        assert!(!Card(1, Suit::Club).is_valid());
        assert!(!Card(15, Suit::Club).is_valid());
    }

    #[test]
    fn test_phase_round_trip() {
        for phase in [
            Phase::Waiting,
            Phase::NewHandDealing,
            Phase::PreFlop,
            Phase::Flop,
            Phase::Turn,
            Phase::River,
            Phase::Showdown,
        ] {
            assert_eq!(Phase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(Phase::parse("lobby"), None);
    }

    #[test]
    fn test_phase_predicates() {
        assert!(!Phase::Waiting.in_hand());
        assert!(Phase::NewHandDealing.in_hand());
        assert!(Phase::PreFlop.is_street());
        assert!(Phase::River.is_street());
        assert!(!Phase::Showdown.in_hand());
        assert!(!Phase::Showdown.is_street());
    }

    #[test]
    fn test_player_reset_for_hand() {
        let mut player = Player::new("p1".to_string(), 0, 1000);
        player.balance = 800;
        player.street_bet = 50;
        player.folded = true;
        player.hole_cards = vec![Card(14, Suit::Spade), Card(13, Suit::Spade)];
        player.hand_desc = Some("Pair of Aces".to_string());

        player.reset_for_hand();

        assert_eq!(player.starting_balance, 800);
        assert_eq!(player.street_bet, 0);
        assert!(!player.folded);
        assert!(player.hole_cards.is_empty());
        assert!(player.hand_desc.is_none());
    }
}
