//! Archive models.
//!
//! [`VideoItem`] is the unit of backup work: it comes out of the metadata
//! provider, travels through the job queue as JSON, and is handed to a
//! storage backend. [`StoredEntry`] is what a backend can reconstruct about
//! an archived video purely from its naming convention.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// One video within one playlist.
///
/// All four fields are guaranteed to be non-empty; construction (including
/// deserialization) fails with [`ErrorKind::Validation`] otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawVideoItem", into = "RawVideoItem")]
pub struct VideoItem {
    video_id: String,
    video_name: String,
    playlist_id: String,
    playlist_name: String,
}

impl VideoItem {
    pub fn new(
        video_id: impl Into<String>,
        video_name: impl Into<String>,
        playlist_id: impl Into<String>,
        playlist_name: impl Into<String>,
    ) -> crate::error::Result<Self> {
        Ok(RawVideoItem {
            video_id: Some(video_id.into()),
            video_name: Some(video_name.into()),
            playlist_id: Some(playlist_id.into()),
            playlist_name: Some(playlist_name.into()),
        }
        .try_into()?)
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn video_name(&self) -> &str {
        &self.video_name
    }

    pub fn playlist_id(&self) -> &str {
        &self.playlist_id
    }

    pub fn playlist_name(&self) -> &str {
        &self.playlist_name
    }

    /// Apply `f` to both human-readable names (video and playlist).
    ///
    /// A name that `f` maps to an empty string is kept as it was.
    pub fn map_names(self, f: impl Fn(&str) -> String) -> Self {
        let keep_non_empty = |original: String| {
            let mapped = f(&original);
            if mapped.is_empty() { original } else { mapped }
        };
        Self {
            video_name: keep_non_empty(self.video_name),
            playlist_name: keep_non_empty(self.playlist_name),
            ..self
        }
    }

    /// `{videoName} ({videoId})`, the stem used by object and cloud-file storage.
    pub fn titled_stem(&self) -> String {
        format!("{} ({})", self.video_name, self.video_id)
    }

    /// JSON representation, as carried in job payloads and error messages.
    pub fn to_json(&self) -> String {
        // Serializing plain strings can't fail.
        serde_json::to_string(&RawVideoItem::from(self.clone())).unwrap_or_default()
    }
}

/// Unvalidated wire form of a [`VideoItem`].
///
/// Job payloads are deserialized into this first, so that a payload with
/// missing keys can still be reported back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVideoItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_name: Option<String>,
}

impl RawVideoItem {
    /// Keys that are absent or empty, in their serialized (camelCase) form.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        [
            ("videoId", &self.video_id),
            ("videoName", &self.video_name),
            ("playlistId", &self.playlist_id),
            ("playlistName", &self.playlist_name),
        ]
        .into_iter()
        .filter(|(_, value)| !present(value))
        .map(|(key, _)| key)
        .collect()
    }
}

impl TryFrom<RawVideoItem> for VideoItem {
    type Error = ErrorKind;

    fn try_from(raw: RawVideoItem) -> Result<Self, Self::Error> {
        let missing = raw.missing_keys();
        if !missing.is_empty() {
            let json = serde_json::to_string(&raw).unwrap_or_default();
            return Err(ErrorKind::Validation(format!("missing [{}] in {json}", missing.join(", "))));
        }
        Ok(Self {
            video_id: raw.video_id.unwrap_or_default(),
            video_name: raw.video_name.unwrap_or_default(),
            playlist_id: raw.playlist_id.unwrap_or_default(),
            playlist_name: raw.playlist_name.unwrap_or_default(),
        })
    }
}

impl From<VideoItem> for RawVideoItem {
    fn from(item: VideoItem) -> Self {
        Self {
            video_id: Some(item.video_id),
            video_name: Some(item.video_name),
            playlist_id: Some(item.playlist_id),
            playlist_name: Some(item.playlist_name),
        }
    }
}

/// What a backend knows about an already-archived video.
///
/// Reconstructed from keys, paths or file names; the video id is only known
/// when the backend's naming convention encodes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredEntry {
    pub video_id: Option<String>,
    pub video_name: String,
    pub playlist_name: String,
}

impl StoredEntry {
    pub fn new(video_id: Option<String>, video_name: impl Into<String>, playlist_name: impl Into<String>) -> Self {
        Self {
            video_id,
            video_name: video_name.into(),
            playlist_name: playlist_name.into(),
        }
    }

    /// Deduplication identity: `(playlistName, videoName)`.
    ///
    /// The video id is deliberately not part of it.
    pub fn key(&self) -> (&str, &str) {
        (&self.playlist_name, &self.video_name)
    }
}

impl From<&VideoItem> for StoredEntry {
    fn from(item: &VideoItem) -> Self {
        Self::new(Some(item.video_id.clone()), &item.video_name, &item.playlist_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_valid() {
        let item = VideoItem::new("dQw4w9WgXcQ", "Never Gonna", "PL1", "Songs").unwrap();
        assert_eq!(item.video_id(), "dQw4w9WgXcQ");
        assert_eq!(item.titled_stem(), "Never Gonna (dQw4w9WgXcQ)");
    }

    #[rstest]
    #[case("", "name", "PL1", "Songs", "videoId")]
    #[case("id", "", "PL1", "Songs", "videoName")]
    #[case("id", "name", "", "Songs", "playlistId")]
    #[case("id", "name", "PL1", "", "playlistName")]
    fn test_new_rejects_empty_fields(
        #[case] id: &str,
        #[case] name: &str,
        #[case] playlist_id: &str,
        #[case] playlist_name: &str,
        #[case] missing: &str,
    ) {
        let err = VideoItem::new(id, name, playlist_id, playlist_name).unwrap_err();
        let message = (*err).to_string();
        assert!(message.starts_with("Invalid videoItem"), "{message}");
        assert!(message.contains(missing), "{message}");
    }

    #[test]
    fn test_json_uses_camel_case() {
        let item = VideoItem::new("a", "V1", "PL1", "P").unwrap();
        assert_eq!(item.to_json(), r#"{"videoId":"a","videoName":"V1","playlistId":"PL1","playlistName":"P"}"#);
        let parsed: VideoItem = serde_json::from_str(&item.to_json()).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_deserialize_reports_missing_keys_and_payload() {
        let err = serde_json::from_str::<VideoItem>(r#"{"videoId":"a","playlistId":"PL1"}"#).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Invalid videoItem"), "{message}");
        assert!(message.contains("videoName, playlistName"), "{message}");
        assert!(message.contains(r#"{"videoId":"a","playlistId":"PL1"}"#), "{message}");
    }

    #[test]
    fn test_map_names_keeps_ids_and_non_empty_names() {
        let item = VideoItem::new("a", "Vidéo", "PL1", "Liste").unwrap();
        let mapped = item.clone().map_names(|s| s.to_uppercase());
        assert_eq!(mapped.video_name(), "VIDÉO");
        assert_eq!(mapped.playlist_name(), "LISTE");
        assert_eq!(mapped.video_id(), "a");
        let emptied = item.clone().map_names(|_| String::new());
        assert_eq!(emptied, item);
    }

    #[test]
    fn test_stored_entry_key_ignores_id() {
        let a = StoredEntry::new(Some("a".into()), "V1", "P");
        let b = StoredEntry::new(Some("b".into()), "V1", "P");
        let c = StoredEntry::new(None, "V1", "P");
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), c.key());
    }
}
