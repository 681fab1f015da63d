//! Backup Error Types
//!
//! Each pipeline step raises its own kind on top of the error of the crate it
//! called into (provider, storage, queue), and the entry points add the id of
//! the playlist, channel or video they were working on. Printing the
//! resulting tree gives the whole causal chain.

use derive_more::{Display, Error};

/// A backup error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("Failed to backup playlist {_0}")]
    Playlist(#[error(not(source))] String),
    #[display("Failed to backup channel {_0}")]
    Channel(#[error(not(source))] String),
    /// Fetching video metadata failed.
    #[display("failed to fetch video metadata")]
    Provider,
    /// Listing what is already archived failed.
    #[display("failed to list existing videos")]
    Inventory,
    /// Submitting a job failed; contains the video id.
    #[display("failed to enqueue video {_0}")]
    Enqueue(#[error(not(source))] String),
    /// A job payload doesn't describe a video. Contains the serialized job.
    #[display("invalid job: {_0}")]
    InvalidJob(#[error(not(source))] String),
    /// Downloading or storing one video failed; contains the video id.
    #[display("failed to back up video {_0}")]
    Video(#[error(not(source))] String),
    #[display("failed to download video")]
    Download,
    #[display("failed to save video")]
    Save,
    /// Talking to the job queue failed.
    #[display("job queue error")]
    Queue,
    /// Assembling the application from configuration failed.
    #[display("invalid configuration: {_0}")]
    Config(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download | Self::Save | Self::Queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::Playlist("PL1".into()).to_string(), "Failed to backup playlist PL1");
        assert_eq!(ErrorKind::Channel("UC1".into()).to_string(), "Failed to backup channel UC1");
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Download.is_retryable());
        assert!(!ErrorKind::InvalidJob("{}".into()).is_retryable());
    }
}
