//! Error handling for the event-stream client.
//!
//! A single strongly-typed [`Error`] enum built on `thiserror`, with
//! constructor helpers, context chaining, and chain-penetrating inspectors.
//!
//! Design constraints:
//! - String payloads use `Cow<'static, str>` so static messages allocate
//!   nothing.
//! - All variants are `Send + Sync + 'static`.
//! - Nothing in this crate panics on a recoverable error path; connection
//!   failures are reported to consumers through their callbacks, never
//!   thrown at the caller of `subscribe`/`send`.

use std::borrow::Cow;
use std::error::Error as StdError;
use thiserror::Error;

/// Result type alias for all client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type for the `eventlink` crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Network/transport layer errors (connect refused, socket reset, TLS).
    #[error("Network error: {0}")]
    Network(Cow<'static, str>),

    /// Operation timeout.
    #[error("Timeout: {0}")]
    Timeout(Cow<'static, str>),

    /// Inbound frame could not be parsed.
    #[error("Parse error: {0}")]
    Parse(Cow<'static, str>),

    /// Operation was cancelled, typically via a `CancellationToken`.
    #[error("Cancelled: {0}")]
    Cancelled(Cow<'static, str>),

    /// Invalid configuration or request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    /// Transport error preserving the original error for downcast.
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// Error with additional context, preserving the error chain.
    #[error("{context}")]
    Context {
        /// Context message describing what operation failed.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a network error.
    pub fn network(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a timeout error.
    pub fn timeout(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a parse error.
    pub fn parse(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates a cancelled error.
    pub fn cancelled(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates an invalid request error.
    pub fn invalid_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a transport error from any error type.
    pub fn transport<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::Transport(Box::new(err))
    }

    /// Attaches context to an existing error.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Internal helper: iterator over the error chain, penetrating
    /// `Context` layers.
    fn iter_chain(&self) -> impl Iterator<Item = &Error> {
        std::iter::successors(Some(self), |err| match err {
            Error::Context { source, .. } => Some(source.as_ref()),
            _ => None,
        })
    }

    /// Returns the root cause of the error, skipping `Context` layers.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        self.iter_chain().last().unwrap_or(self)
    }

    /// Checks if this error is retryable (penetrates `Context` layers).
    ///
    /// Returns `true` for `Network`, `Timeout`, and `Transport` errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::Network(_) | Error::Timeout(_) | Error::Transport(_)
        )
    }

    /// Checks if this is a cancelled error (penetrates `Context` layers).
    /// Returns the error message.
    #[must_use]
    pub fn as_cancelled(&self) -> Option<&str> {
        match self.root_cause() {
            Error::Cancelled(msg) => Some(msg.as_ref()),
            _ => None,
        }
    }

    /// Generates a detailed error report with the full chain.
    #[must_use]
    pub fn report(&self) -> String {
        use std::fmt::Write;
        let mut report = String::new();
        report.push_str(&self.to_string());

        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(err) = current {
            let _ = write!(report, "\nCaused by: {err}");
            current = err.source();
        }
        report
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(Cow::Owned(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_display() {
        let err = Error::network("Connection refused");
        assert!(err.to_string().contains("Connection refused"));

        let err = Error::timeout("connect timed out");
        assert!(err.to_string().starts_with("Timeout"));

        let err = Error::cancelled("shutdown");
        assert_eq!(err.as_cancelled(), Some("shutdown"));
    }

    #[test]
    fn test_context_chain() {
        let err = Error::network("Connection refused").context("failed to open stream");
        assert_eq!(err.to_string(), "failed to open stream");
        assert!(matches!(err.root_cause(), Error::Network(_)));
        assert!(err.is_retryable());

        let report = err.report();
        assert!(report.contains("failed to open stream"));
        assert!(report.contains("Caused by: Network error: Connection refused"));
    }

    #[test]
    fn test_cancelled_through_context() {
        let err = Error::cancelled("manual disconnect").context("wrapped");
        assert_eq!(err.as_cancelled(), Some("manual disconnect"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_from_serde() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_error_size_stays_small() {
        assert!(std::mem::size_of::<Error>() <= 56);
    }
}
