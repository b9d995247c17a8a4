//! Core error taxonomy.
//!
//! Kinds, not type names: every fallible core operation returns this enum so
//! that callers (the pipeline's retry wrapping, the CLI's exit-code mapping)
//! can match on *kind* rather than parse error strings.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Entity missing; recoverable by create-on-demand for `Repo`.
    #[error("not found: {0}")]
    NotFound(String),

    /// Empty repo name, empty label set, invalid similarity/confidence
    /// range, invalid duration.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Vectors cannot be compared (dedup skips silently on this one).
    #[error("dimension mismatch: {a} vs {b}")]
    DimensionMismatch { a: usize, b: usize },

    /// Externally imposed; triggers a scheduled wait, never fatal alone.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    /// Per-call deadline exceeded.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Malformed payload from embedder/completer/notifier.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Any other I/O failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration invalid at startup, store open/migration failure.
    #[error("fatal: {0}")]
    Fatal(String),

    /// The embed call itself failed (dedup's own wrapping, keeps the
    /// underlying cause visible).
    #[error("embedding failed: {0}")]
    EmbeddingFailed(Box<Error>),

    /// The complete call itself failed (classifier's own wrapping).
    #[error("completion failed: {0}")]
    CompletionFailed(Box<Error>),

    /// Root cancellation was observed; callers propagate this unchanged so
    /// `run()` methods can report a clean shutdown.
    #[error("cancelled")]
    Cancelled,

    /// Multiple independent failures joined into one value (e.g.
    /// `MultiNotifier` fanning out to several webhooks). Keeps each
    /// constituent error around rather than flattening to a string, so
    /// callers can match on or inspect any one of them.
    #[error("{} errors: {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Joined(Vec<Error>),
}

impl Error {
    pub fn not_found(what: impl fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }

    pub fn bad_input(what: impl fmt::Display) -> Self {
        Error::BadInput(what.to_string())
    }

    /// `true` for the kinds C2's retry helper should keep retrying on.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimit { .. } | Error::Timeout(_) | Error::Transport(_)
        )
    }

    /// Joins zero-or-more failures into one `Error`, preserving each
    /// constituent rather than flattening to text. An empty `errors` is a
    /// logic error in the caller (nothing to join) and panics; callers like
    /// `MultiNotifier` only reach this path once they've observed at least
    /// one failure.
    pub fn join(errors: Vec<Error>) -> Self {
        assert!(!errors.is_empty(), "Error::join called with no errors");
        Error::Joined(errors)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
