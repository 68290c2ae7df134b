//! Error types for ContentBridge.
//!
//! Library crates use [`ContentBridgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Most failures inside a transform pass are recovered locally (a failed image
//! download degrades to the remote URL, an unknown tag renders nothing). The
//! variants here cover what is left: bad configuration, host storage failures,
//! and input the pipeline refuses to start on.

use std::path::PathBuf;

/// Top-level error type for all ContentBridge operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentBridgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while downloading a remote asset.
    #[error("network error: {0}")]
    Network(String),

    /// Markup or template parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Host storage error (asset index, queue, content records, metadata).
    #[error("storage error: {0}")]
    Storage(String),

    /// Asset ingestion error (unusable URL, library rejected the file).
    #[error("asset error: {0}")]
    Asset(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (empty content, unknown record, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ContentBridgeError>;

impl ContentBridgeError {
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

    /// Create a storage error from any displayable message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an asset error from any displayable message.
    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for ContentBridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ContentBridgeError::config("unknown image mode");
        assert_eq!(err.to_string(), "config error: unknown image mode");

        let err = ContentBridgeError::validation("content is empty");
        assert!(err.to_string().contains("content is empty"));
    }

    #[test]
    fn json_errors_convert() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ContentBridgeError = parse_err.into();
        assert!(err.to_string().starts_with("serialization error:"));
    }
}
