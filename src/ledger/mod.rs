//! Player balance ledger: keyed chip balances backed by an append-only
//! transaction log.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{LedgerError, LedgerResult};
pub use manager::LedgerManager;
pub use models::{Account, EntryKind, LedgerEntry};
