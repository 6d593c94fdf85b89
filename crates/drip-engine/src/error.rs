use std::time::Duration;

use drip_core::OwnerId;
use drip_store::StoreError;
use thiserror::Error;

use crate::mailer::MailerError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mailer error: {0}")]
    Mailer(#[from] MailerError),

    #[error("Owner {0} is not in the loaded batch")]
    UnknownOwner(OwnerId),

    #[error("Owner {0} has no installation")]
    NotInstalled(OwnerId),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, EngineError>;
