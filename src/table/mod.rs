//! Table layer: seats, readiness, host transfer, timers, and the adapter
//! between the game engine and the event pipeline.
//!
//! A table owns at most one running [`Game`](crate::game::Game) and never
//! references the stream registry or the database directly; everything it
//! wants the outside world to see goes through the publish capability it
//! was constructed with.

pub mod config;
pub mod table;

pub use config::{MAX_SEATS, TableConfig};
pub use table::{LeaveOutcome, Table, User};
