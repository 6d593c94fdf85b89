//! `drip-core` — shared configuration, errors and domain types for the
//! lifecycle email engine.
//!
//! Everything here is plain data: no I/O beyond reading the config file.

pub mod config;
pub mod error;
pub mod rows;
pub mod types;

pub use config::DripConfig;
pub use error::{DripError, Result};
pub use rows::RawBatch;
pub use types::{CampaignKind, CreditKind, EmailType, OwnerId, SendStatus};
