// src/error.rs

//! Crate-wide error type and the injectable error policy.

use thiserror::Error;

/// Errors surfaced by the progress/lock coordinator
#[derive(Error, Debug)]
pub enum Error {
    /// Programmer misuse of the state machine: steps configured twice in
    /// one generation, `done()` without steps, `done()` past completion,
    /// weights that do not sum to 100, releasing an unheld lock id.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The shared cancellation token was set.
    #[error("cancelled by user action")]
    Cancelled,

    /// A requested resource claim could not be granted.
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),

    /// I/O failure while managing a lock file.
    #[error("lock i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Verdict returned by an injected error policy.
///
/// `Ignore` swallows the error as a soft failure (logged, the operation
/// continues); `Fatal` lets it surface and unwind the active chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorAction {
    Ignore,
    #[default]
    Fatal,
}
