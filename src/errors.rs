//! Crate-level error type and the error-kind classification returned to
//! callers.

use thiserror::Error;

use crate::db::StoreError;
use crate::game::engine::GameError;
use crate::game::entities::{Chips, SeatIndex};
use crate::ledger::LedgerError;

/// Coarse error classes surfaced across the facade boundary. Transports map
/// these onto their own status codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Table or player missing; returned to the caller, not fatal.
    NotFound,
    /// Game not started, out of turn, insufficient balance, seat taken.
    FailedPrecondition,
    /// Malformed card, negative bet, unknown config value.
    InvalidArgument,
    /// Persistence failure or broken state-machine invariant; logged and
    /// surfaced as opaque.
    Internal,
    /// Send on a closed stream; deregister, never surface.
    StreamClosed,
}

/// Errors returned by facade and table operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("table {0} not found")]
    TableNotFound(String),
    #[error("player {0} not found")]
    PlayerNotFound(String),
    #[error("player {0} is already seated")]
    DuplicateUser(String),
    #[error("player {player_id} is already seated at table {table_id}")]
    AlreadyAtTable { player_id: String, table_id: String },
    #[error("seat {0} is occupied")]
    SeatOccupied(SeatIndex),
    #[error("table is full")]
    TableFull,
    #[error("Insufficient DCR balance: available {available}, required {required}")]
    InsufficientBalance { available: Chips, required: Chips },
    #[error("no game in progress")]
    GameNotStarted,
    #[error("a game is already in progress")]
    GameInProgress,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    FailedPrecondition(String),
    #[error("stream closed")]
    StreamClosed,
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Classify into the kind reported across the facade boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TableNotFound(_) | Error::PlayerNotFound(_) => ErrorKind::NotFound,
            Error::DuplicateUser(_)
            | Error::AlreadyAtTable { .. }
            | Error::SeatOccupied(_)
            | Error::TableFull
            | Error::InsufficientBalance { .. }
            | Error::GameNotStarted
            | Error::GameInProgress
            | Error::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::StreamClosed => ErrorKind::StreamClosed,
            Error::Internal(_) | Error::Store(_) => ErrorKind::Internal,
            Error::Game(err) => match err {
                GameError::InvalidBetAmount(_) => ErrorKind::InvalidArgument,
                GameError::UnknownPlayer(_) => ErrorKind::NotFound,
                _ => ErrorKind::FailedPrecondition,
            },
            Error::Ledger(err) => match err {
                LedgerError::InsufficientBalance { .. } => ErrorKind::FailedPrecondition,
                LedgerError::AccountNotFound(_) => ErrorKind::NotFound,
                LedgerError::InvalidAmount(_) => ErrorKind::InvalidArgument,
                LedgerError::Database(_) => ErrorKind::Internal,
            },
        }
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::TableNotFound("t1".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::TableFull.kind(), ErrorKind::FailedPrecondition);
        assert_eq!(
            Error::InsufficientBalance {
                available: 500,
                required: 1000
            }
            .kind(),
            ErrorKind::FailedPrecondition
        );
        assert_eq!(
            Error::InvalidArgument("bad card".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(Error::StreamClosed.kind(), ErrorKind::StreamClosed);
        assert_eq!(Error::Internal("oops".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_game_error_kinds() {
        assert_eq!(
            Error::from(GameError::OutOfTurn).kind(),
            ErrorKind::FailedPrecondition
        );
        assert_eq!(
            Error::from(GameError::InvalidBetAmount(-5)).kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_insufficient_balance_message_names_dcr() {
        let err = Error::InsufficientBalance {
            available: 500,
            required: 1000,
        };
        assert!(err.to_string().contains("Insufficient DCR balance"));
    }
}
