use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use reqwest::Url;

const WATCH_URL: &str = "https://www.youtube.com/watch";

/// Canonical watch page URL for a video id.
///
/// ```
/// use tubevault_youtube::watch_url;
///
/// let url = watch_url("dQw4w9WgXcQ").unwrap();
/// assert_eq!(url.as_str(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
/// assert!(watch_url("").is_err());
/// ```
pub fn watch_url(video_id: &str) -> Result<Url> {
    let valid = !video_id.is_empty() && video_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        exn::bail!(ErrorKind::InvalidVideoId(video_id.to_string()));
    }
    Url::parse_with_params(WATCH_URL, &[("v", video_id)]).or_raise(|| ErrorKind::InvalidVideoId(video_id.to_string()))
}
