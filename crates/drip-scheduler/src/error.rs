use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The time of day is not a valid "HH:MM" in 24-hour UTC.
    #[error("Invalid time of day: {0:?} (expected HH:MM)")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
