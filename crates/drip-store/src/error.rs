use drip_core::{EmailType, OwnerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// `confirm` found no reservation held by the caller, e.g. a
    /// stale-reservation sweep released it mid-delivery and another run
    /// took the slot.
    #[error("No reservation for owner {owner_id} / {email_type}")]
    NotReserved {
        owner_id: OwnerId,
        email_type: EmailType,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
