//! Poker game engine: cards, hand evaluation, and the per-hand state
//! machine.
//!
//! The engine is deliberately self-contained: it owns cards, chips, and
//! turn order, and knows nothing about tables, streams, or storage. The
//! table layer drives it and publishes the resulting state transitions.

pub mod engine;
pub mod entities;
pub mod eval;

pub use engine::{ActionOutcome, AppliedAction, Game, GameError, ShowdownSummary};
pub use entities::{
    Card, Chips, Deck, Phase, Player, PlayerAction, PlayerId, SeatIndex, Suit, TableId, Value,
};
pub use eval::{HandRank, HandValue, evaluate};
