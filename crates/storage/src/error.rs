//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Backends raise the low-level kinds
//! ([`Io`](ErrorKind::Io), [`Network`](ErrorKind::Network), ...) and the
//! [`StorageBackend`](crate::StorageBackend) wrappers raise
//! [`List`](ErrorKind::List) or [`Save`](ErrorKind::Save) on top of them.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A video item is missing required keys. Contains the missing keys and
    /// the JSON-serialized item.
    #[display("Invalid videoItem: {_0}")]
    Validation(#[error(not(source))] String),
    /// Enumerating the archive of the named backend failed.
    #[display("failed to list contents of `{_0}` storage")]
    List(#[error(not(source))] String),
    /// A listed entry doesn't follow the backend's naming convention.
    #[display("unrecognised entry in storage listing: {_0}")]
    MalformedEntry(#[error(not(source))] String),
    /// Writing the JSON-serialized video item to the backend failed.
    #[display("failed to save {_0}")]
    Save(#[error(not(source))] String),
    /// Name can't be used as a single path segment or object key component.
    #[display("invalid path segment: {_0:?}")]
    InvalidPath(#[error(not(source))] String),
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (S3 connections, HTTP APIs, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// The configuration section for the named backend is missing or invalid.
    #[display("invalid configuration for `{_0}` storage")]
    Config(#[error(not(source))] String),
    /// Not one of the known backend names.
    #[display("invalid storage name: {_0}")]
    InvalidStorageName(#[error(not(source))] String),
    /// Backend exists but support for it wasn't compiled in.
    #[display("storage backend `{_0}` is not enabled in this build")]
    Disabled(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::BackendError(_))
    }
}
