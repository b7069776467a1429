// src/error.rs
//! Error types for the location provider

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LocationError>;

#[derive(Debug, Error)]
pub enum LocationError {
    /// Caller input was rejected; no state was changed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The acquisition source cannot produce locations (fatal at construction).
    #[error("Location provider unavailable: {0}")]
    Unavailable(String),
    /// A synchronous fetch was aborted by `reset`.
    #[error("Location request cancelled by reset")]
    Cancelled,
    #[error("No location obtained within {0:?}")]
    Timeout(Duration),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LocationError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        LocationError::InvalidArgument(msg.into())
    }

    /// True for the caller-input rejection class of errors
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, LocationError::InvalidArgument(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = LocationError::invalid("interval -2 is below -1");
        assert_eq!(err.to_string(), "Invalid argument: interval -2 is below -1");
        assert!(err.is_invalid_argument());

        let err = LocationError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "No location obtained within 1.5s");
        assert!(!err.is_invalid_argument());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: LocationError = io.into();
        assert!(matches!(err, LocationError::Io(_)));
    }
}
