//! Error type shared by the ingestion, storage and server layers.
//!
//! The tiling core itself is total and never returns these.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GPX parsing failed for '{source_name}': {message}")]
    Gpx {
        source_name: String,
        message: String,
    },

    #[error("polyline decoding failed for '{source_name}': {message}")]
    Polyline {
        source_name: String,
        message: String,
    },

    #[error("invalid track '{source_name}': {message}")]
    InvalidTrack {
        source_name: String,
        message: String,
    },

    #[error("invalid viewport: {0}")]
    InvalidViewport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ExplorerError {
    /// Failures that may go away on a later attempt, such as a file still
    /// being written. Parse and validation failures are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExplorerError::Io(_) | ExplorerError::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, ExplorerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExplorerError::InvalidTrack {
            source_name: "activity_42.gpx".to_string(),
            message: "no track points".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid track 'activity_42.gpx': no track points"
        );
    }

    #[test]
    fn test_from_json_error() {
        let parse: std::result::Result<Vec<u32>, _> = serde_json::from_str("[1,");
        let err: ExplorerError = parse.unwrap_err().into();
        assert!(matches!(err, ExplorerError::Json(_)));
    }

    #[test]
    fn test_io_errors_are_retryable() {
        let io = ExplorerError::from(std::io::Error::new(std::io::ErrorKind::Other, "busy"));
        assert!(io.is_retryable());
        let bad = ExplorerError::Gpx {
            source_name: "a.gpx".to_string(),
            message: "unexpected end".to_string(),
        };
        assert!(!bad.is_retryable());
    }
}
