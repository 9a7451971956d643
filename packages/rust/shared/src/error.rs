//! Error types for Thyself.
//!
//! Library crates use [`ThyselfError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Thyself operations.
#[derive(Debug, thiserror::Error)]
pub enum ThyselfError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the analysis backend.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad payload shape, invalid value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Message protocol error (unknown action, closed channel, relay failure).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ThyselfError>;

impl ThyselfError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for ThyselfError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ThyselfError::config("missing backend url");
        assert_eq!(err.to_string(), "config error: missing backend url");

        let err = ThyselfError::validation("payload.ids must be an array");
        assert!(err.to_string().contains("payload.ids"));

        let err = ThyselfError::Protocol("unknown action: NOPE".into());
        assert_eq!(err.to_string(), "protocol error: unknown action: NOPE");
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err: ThyselfError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ThyselfError::Parse { .. }));
    }
}
