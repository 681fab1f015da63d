//! Queue Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A queue error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The job doesn't exist, or isn't in the `active` state it would need
    /// to be in for the requested transition.
    #[display("job {_0} is not active")]
    NotActive(#[error(not(source))] i64),
    #[display("job {_0} not found")]
    NotFound(#[error(not(source))] i64),
    /// Payload couldn't be serialized to JSON.
    #[display("invalid job payload")]
    Payload,
    /// A stored row doesn't map back onto the model.
    #[display("invalid queue data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
