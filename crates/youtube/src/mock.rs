//! In-memory provider and downloader for testing.

use crate::error::{ErrorKind, Result};
use crate::{Downloader, MetadataProvider};
use async_trait::async_trait;
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;
use tubevault_storage::{BoxAsyncRead, VideoItem};

/// Serves playlists and channels from memory.
///
/// # Examples
///
/// ```
/// use tubevault_storage::VideoItem;
/// use tubevault_youtube::{MetadataProvider, mock::MockProvider};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let provider = MockProvider::default()
///     .with_playlist("PL1", [VideoItem::new("a", "V1", "PL1", "P").unwrap()])
///     .with_channel("UC1", ["PL1"]);
/// assert_eq!(provider.channel_video_items("UC1").await.unwrap().len(), 1);
/// assert!(provider.playlist_video_items("PL2").await.is_err());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockProvider {
    playlists: HashMap<String, Vec<VideoItem>>,
    channels: HashMap<String, Vec<String>>,
}

impl MockProvider {
    pub fn with_playlist(mut self, playlist_id: impl Into<String>, items: impl IntoIterator<Item = VideoItem>) -> Self {
        self.playlists.insert(playlist_id.into(), items.into_iter().collect());
        self
    }

    pub fn with_channel(
        mut self,
        channel_id: impl Into<String>,
        playlist_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.channels.insert(channel_id.into(), playlist_ids.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl MetadataProvider for MockProvider {
    async fn playlist_video_items(&self, playlist_id: &str) -> Result<Vec<VideoItem>> {
        match self.playlists.get(playlist_id) {
            Some(items) => Ok(items.clone()),
            None => exn::bail!(ErrorKind::PlaylistNotFound(playlist_id.to_string())),
        }
    }

    async fn channel_video_items(&self, channel_id: &str) -> Result<Vec<VideoItem>> {
        let Some(playlist_ids) = self.channels.get(channel_id) else {
            exn::bail!(ErrorKind::ChannelNotFound(channel_id.to_string()));
        };
        let mut items = Vec::new();
        for playlist_id in playlist_ids {
            items.extend(self.playlist_video_items(playlist_id).await?);
        }
        Ok(items)
    }
}

/// "Downloads" `video {id}` for every video id, recording each request.
#[derive(Debug, Default)]
pub struct MockDownloader {
    failing: HashSet<String>,
    requested: Mutex<Vec<String>>,
}

impl MockDownloader {
    /// Make downloads of the given video id fail.
    pub fn failing_for(mut self, video_id: impl Into<String>) -> Self {
        self.failing.insert(video_id.into());
        self
    }

    /// Video ids requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Bytes served for a video id.
    pub fn content(video_id: &str) -> Vec<u8> {
        format!("video {video_id}").into_bytes()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn download(&self, url: &Url) -> Result<BoxAsyncRead> {
        let video_id = url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(video_id.clone());
        }
        if self.failing.contains(&video_id) {
            exn::bail!(ErrorKind::Download(url.to_string()));
        }
        Ok(Box::new(Cursor::new(Self::content(&video_id))))
    }
}
