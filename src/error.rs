//! Centralized error types for mailsink.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailsink library.
#[derive(Error, Debug)]
pub enum MailsinkError {
    /// The top-level MIME source could not be parsed at all.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A single part could not be decoded. Extraction degrades the part to a
    /// best-effort attachment instead of returning this.
    #[error("Could not decode part '{part}': {reason}")]
    PartDecoding { part: String, reason: String },

    /// A message id, content-id or attachment index has no match.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The query string is empty or not valid XPath.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The message sender failed to build or deliver a message.
    #[error("Send error: {0}")]
    Send(String),

    /// A blocking task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),
}

/// Convenience alias for `Result<T, MailsinkError>`.
pub type Result<T> = std::result::Result<T, MailsinkError>;

impl MailsinkError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a missing mail.
    pub fn mail_not_found(id: u64) -> Self {
        Self::NotFound(format!("mail {id}"))
    }
}

/// Allow `?` on `std::io::Error` when no path context is available.
impl From<std::io::Error> for MailsinkError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            MailsinkError::mail_not_found(7).to_string(),
            "Not found: mail 7"
        );
        assert_eq!(
            MailsinkError::InvalidQuery("empty".into()).to_string(),
            "Invalid query: empty"
        );
    }
}
