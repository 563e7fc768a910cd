//! Error types for redraft.
//!
//! Library crates use [`RedraftError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! [`ExtractError`] and [`ApplyError`] are the structured, recoverable
//! outcomes of the two core entry points. Each exposes a short
//! machine-readable [`reason`](ApplyError::reason) code.

use std::path::PathBuf;

/// Top-level error type for all redraft operations.
#[derive(Debug, thiserror::Error)]
pub enum RedraftError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Block markup or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Proposal generator error (bridge, provider, or response shape).
    #[error("generator error: {0}")]
    Generator(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Analysis could not run.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// A suggestion could not be applied.
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RedraftError>;

impl RedraftError {
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

    /// Machine-readable reason code, when the error is a core outcome.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Extract(e) => Some(e.reason()),
            Self::Apply(e) => Some(e.reason()),
            _ => None,
        }
    }
}

/// Failure of the `analyze` entry point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// The requested document does not exist.
    #[error("document not found")]
    NotFound,
}

impl ExtractError {
    /// Short machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
        }
    }
}

/// Failure of the `apply` entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// The requested document does not exist.
    #[error("document not found")]
    NotFound,

    /// The document has no block structure; rewrites need addressable blocks.
    #[error("no blocks found (rewrite requires block markup)")]
    NoContent,

    /// Every requested item was malformed.
    #[error("no valid rewrite items")]
    NoValidItems,

    /// No requested block matched its expected fingerprint.
    #[error("no rewrites applied (content may have changed since suggestion)")]
    NothingApplied,

    /// The insertion marker is already present in the document.
    #[error("already applied (marker detected)")]
    AlreadyApplied,

    /// The storage layer refused the write. Carries its message verbatim.
    #[error("persist failed: {0}")]
    PersistFailed(String),

    /// The suggestion carried nothing to apply.
    #[error("nothing to apply: {0}")]
    EmptySuggestion(&'static str),
}

impl ApplyError {
    /// Short machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NoContent => "no_content",
            Self::NoValidItems => "no_valid_items",
            Self::NothingApplied => "nothing_applied",
            Self::AlreadyApplied => "already_applied",
            Self::PersistFailed(_) => "persist_failed",
            Self::EmptySuggestion(_) => "empty_suggestion",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RedraftError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = RedraftError::validation("missing suggestions array");
        assert!(err.to_string().contains("suggestions array"));
    }

    #[test]
    fn apply_reasons_are_stable() {
        assert_eq!(ApplyError::NoContent.reason(), "no_content");
        assert_eq!(ApplyError::NothingApplied.reason(), "nothing_applied");
        assert_eq!(ApplyError::AlreadyApplied.reason(), "already_applied");
        assert_eq!(
            ApplyError::PersistFailed("disk full".into()).reason(),
            "persist_failed"
        );
    }

    #[test]
    fn persist_failed_surfaces_message_verbatim() {
        let err = ApplyError::PersistFailed("database is locked".into());
        assert!(err.to_string().ends_with("database is locked"));
    }

    #[test]
    fn wrapped_errors_keep_reason() {
        let err: RedraftError = ExtractError::NotFound.into();
        assert_eq!(err.reason(), Some("not_found"));
        assert_eq!(err.to_string(), "document not found");

        let err = RedraftError::Storage("boom".into());
        assert_eq!(err.reason(), None);
    }
}
