//! Error types for tracker2gcal.

use thiserror::Error;

/// Errors that can occur while parsing stories or syncing releases.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("Invalid datetime '{0}'")]
    Format(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Cannot schedule release '{0}': it has neither a deadline nor an iteration finish")]
    Scheduling(String),

    #[error("Remote operation failed for {item}: status {status} ({reason})")]
    RemoteOperation {
        item: String,
        status: u16,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<roxmltree::Error> for TrackerError {
    fn from(e: roxmltree::Error) -> Self {
        TrackerError::Parse(e.to_string())
    }
}

/// Result type alias for tracker2gcal operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
