//! `drip-store` — SQLite persistence for owner data and the send ledger.

pub mod batch;
pub mod db;
pub mod error;
pub mod ledger;
pub mod store;

pub use batch::OwnerSource;
pub use error::{Result, StoreError};
pub use ledger::SendLedger;
pub use store::SqliteStore;
