//! Path segment validation.
//!
//! Every backend builds keys from exactly two human-supplied segments: the
//! playlist name (a directory / key prefix) and the file name derived from
//! the video name. Names are normally [sanitized](crate::sanitize) already,
//! but backends don't trust that and check again before touching storage.

use crate::error::{ErrorKind, Result};

/// Ensures `segment` is usable as exactly one path component.
///
/// Rejects empty segments, `.` and `..`, forward slashes and null bytes (which
/// pass through Rust's path handling on Unix but truncate C-based syscalls).
///
/// # Examples
///
/// ```
/// use tubevault_storage::validate_segment;
/// assert!(validate_segment("My Playlist").is_ok());
/// assert!(validate_segment("Song (dQw4w9WgXcQ).mp4").is_ok());
/// assert!(validate_segment("..").is_err());
/// assert!(validate_segment("a/b").is_err());
/// assert!(validate_segment("\\u6771\\u4eac").is_ok());
/// assert!(validate_segment("a\0b").is_err());
/// ```
pub fn validate_segment(segment: &str) -> Result<&str> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\0']);
    if invalid {
        exn::bail!(ErrorKind::InvalidPath(segment.to_string()));
    }
    Ok(segment)
}
