//! Error types for the fae updater.

use std::error::Error as StdError;

/// Top-level error type for constructing and configuring the updater.
///
/// Runtime failures of the update state machine are never returned to the
/// caller; they are recorded in the session as an [`UpdateError`].
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Version string could not be parsed.
    #[error("version error: {0}")]
    Version(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sequential worker could not be started or has gone away.
    #[error("worker error: {0}")]
    Worker(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// A failure of one update command: network I/O, precondition violation,
/// cancellation or launch failure.
///
/// The message is what the UI shows; the optional cause keeps the underlying
/// error chain for logging.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct UpdateError {
    message: String,
    #[source]
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl UpdateError {
    /// Create an error with a message and no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap an underlying failure. The message gets an `Error: ` prefix.
    pub fn wrap(message: &str, cause: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            message: format!("Error: {message}"),
            cause: Some(Box::new(cause)),
        }
    }

    /// The user-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The wrapped failure, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

/// Failure reported by a [`Retriever`](crate::update::retriever::Retriever).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The progress callback asked the transfer to stop.
    #[error("transfer cancelled")]
    Cancelled,

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Connection, TLS or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Local file or stream error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Returns `true` for the distinguished cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
