use thiserror::Error;

#[derive(Debug, Error)]
pub enum DripError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown email type: {0}")]
    UnknownEmailType(String),

    #[error("Unknown campaign: {0}")]
    UnknownCampaign(String),
}

impl DripError {
    /// Short machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            DripError::Config(_) => "CONFIG_ERROR",
            DripError::UnknownEmailType(_) => "UNKNOWN_EMAIL_TYPE",
            DripError::UnknownCampaign(_) => "UNKNOWN_CAMPAIGN",
        }
    }
}

pub type Result<T> = std::result::Result<T, DripError>;
