//! # Relay Poker
//!
//! Server-side core of a multi-table Texas Hold'em poker service.
//!
//! The crate hosts concurrent tables, runs the per-hand state machine
//! (seating, readiness, dealing, betting streets, showdown), fans state out
//! to connected players over long-lived streams, and survives process
//! restarts by persisting table and per-player state atomically.
//!
//! ## Architecture
//!
//! Every externally observable mutation follows one pattern:
//!
//! ```text
//! acquire locks -> mutate -> capture snapshot -> release -> publish event
//! ```
//!
//! Events carry immutable deep-copy snapshots into a bounded queue drained
//! by a fixed worker pool. For each event the workers run three handlers in
//! order: the notification broadcaster, the per-player game-update builder,
//! and the persistence writer. Nothing downstream ever re-enters the
//! engine, so the engine's locks stay small and deadlock-free.
//!
//! ## Core Modules
//!
//! - [`game`]: cards, hand evaluation, and the per-hand state machine
//! - [`table`]: seats, readiness, host transfer, timers
//! - [`events`]: typed events, the bounded pipeline, and the fan-out
//!   handlers
//! - [`snapshot`]: immutable value snapshots crossing worker boundaries
//! - [`ledger`]: keyed balances with an append-only transaction log
//! - [`db`]: SQLite persistence and boot-time restore
//! - [`server`]: the lobby/poker facade the transport layer calls
//!
//! ## Example
//!
//! ```no_run
//! use relay_poker::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> relay_poker::Result<()> {
//!     let server = Server::start(ServerConfig::default()).await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod game;
pub mod ledger;
pub mod server;
pub mod snapshot;
pub mod streams;
pub mod table;

pub use config::{DebugLevel, ServerConfig};
pub use errors::{Error, ErrorKind, Result};
pub use game::{
    Card, Chips, Phase, PlayerAction, PlayerId, SeatIndex, Suit, TableId, entities, evaluate,
};
pub use server::Server;
pub use snapshot::{GameSnapshot, PlayerSnapshot, TableSnapshot};
