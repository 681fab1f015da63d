//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration file extension isn't one of TOML, YAML or JSON.
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// A dotted path was looked up but nothing is configured there.
    #[display("missing configuration key: {_0}")]
    Missing(#[error(not(source))] String),
    /// Something is configured at the dotted path, but it has the wrong shape
    /// or fails validation.
    #[display("invalid configuration at `{_0}`")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Missing("storage.s3".to_string()).to_string(), "missing configuration key: storage.s3");
        assert_eq!(ErrorKind::Invalid("queue".to_string()).to_string(), "invalid configuration at `queue`");
    }
}
