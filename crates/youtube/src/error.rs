//! YouTube Error Types

use derive_more::{Display, Error};

/// A provider or download error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for provider and download operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request never got an HTTP response.
    #[display("request to {_0} failed")]
    Request(#[error(not(source))] String),
    /// The API answered with an error status; contains the status and body.
    #[display("YouTube API error: {_0}")]
    Api(#[error(not(source))] String),
    /// A response was missing required fields. Contains the raw JSON.
    #[display("unexpected response from YouTube API: {_0}")]
    Parse(#[error(not(source))] String),
    /// No playlist with the given id is visible to the API key.
    #[display("playlist not found: {_0}")]
    PlaylistNotFound(#[error(not(source))] String),
    #[display("channel not found: {_0}")]
    ChannelNotFound(#[error(not(source))] String),
    /// Not a syntactically valid video id.
    #[display("invalid video id: {_0:?}")]
    InvalidVideoId(#[error(not(source))] String),
    /// The download program couldn't be started.
    #[display("failed to start `{_0}`")]
    Spawn(#[error(not(source))] String),
    /// Downloading the given URL failed.
    #[display("failed to download {_0}")]
    Download(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Download(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::PlaylistNotFound("PL1".into()).to_string(), "playlist not found: PL1");
        assert_eq!(ErrorKind::InvalidVideoId("a b".into()).to_string(), "invalid video id: \"a b\"");
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Request("x".into()).is_retryable());
        assert!(!ErrorKind::Parse("{}".into()).is_retryable());
    }
}
