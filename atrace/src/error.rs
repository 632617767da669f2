//! Error handling module for the atrace CLI.
//!
//! Structured errors via `thiserror`; `anyhow` is only used at the edge of
//! `main`.

use alloctrace::TracerError;
use thiserror::Error;

/// Main error type for the atrace CLI application.
#[derive(Error, Debug)]
pub enum AtraceError {
    /// Error when a configuration file is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error when command-line input validation fails.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error when a line of the event stream cannot be understood.
    #[error("Event stream line {line}: {message}")]
    Event { line: usize, message: String },

    /// Error reported by the tracer.
    #[error("Tracer error: {0}")]
    Tracer(#[from] TracerError),

    /// Error when IO operations fail.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error when JSON serialization/deserialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error when a TOML configuration cannot be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias using AtraceError.
pub type Result<T> = std::result::Result<T, AtraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = AtraceError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_event_error_display() {
        let err = AtraceError::Event {
            line: 3,
            message: "unknown op".to_string(),
        };
        assert_eq!(err.to_string(), "Event stream line 3: unknown op");
    }

    #[test]
    fn test_tracer_error_conversion() {
        let err: AtraceError = TracerError::UnknownField("file".to_string()).into();
        assert!(matches!(err, AtraceError::Tracer(_)));
        assert!(err.to_string().contains("unknown key field"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AtraceError = io_err.into();
        assert!(matches!(err, AtraceError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Table>("= broken").unwrap_err();
        let err: AtraceError = toml_err.into();
        assert!(matches!(err, AtraceError::Toml(_)));
    }
}
