//! Centralized error types for mailgrab.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailgrab library.
///
/// Decoding problems are deliberately absent: label and header decoding
/// always produce text, falling back to the raw input.
#[derive(Error, Debug)]
pub enum MailgrabError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The server could not be reached.
    #[error("Connection to {server} failed: {reason}")]
    Connection { server: String, reason: String },

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server rejected the credentials.
    #[error("Authentication failed for {address}: {reason}")]
    Authentication { address: String, reason: String },

    /// The session failed mid-conversation (dropped connection, bad response).
    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    /// A fetched message could not be parsed at all.
    #[error("Failed to parse message: {0}")]
    Parse(String),

    /// A search window could not be built from the given year/month.
    #[error("Invalid search window: {0}")]
    InvalidWindow(String),

    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The password could not be obtained.
    #[error("Could not read password: {0}")]
    Secret(String),
}

/// Convenience alias for `Result<T, MailgrabError>`.
pub type Result<T> = std::result::Result<T, MailgrabError>;

impl MailgrabError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<imap::Error> for MailgrabError {
    fn from(err: imap::Error) -> Self {
        match err {
            imap::Error::Io(e) => Self::Protocol(format!("connection lost: {e}")),
            imap::Error::Tls(e) => Self::Tls(e.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }
}
