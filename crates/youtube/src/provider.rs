//! Video metadata from the YouTube Data API v3.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;
use tubevault_config::YoutubeSettings;
use tubevault_storage::VideoItem;

/// Largest page size the API allows.
const MAX_RESULTS: &str = "50";

/// Source of the videos that make up a playlist or a channel.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Videos of one playlist, in playlist order.
    async fn playlist_video_items(&self, playlist_id: &str) -> Result<Vec<VideoItem>>;

    /// Videos of every playlist owned by a channel, playlist by playlist.
    async fn channel_video_items(&self, channel_id: &str) -> Result<Vec<VideoItem>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Playlist {
    id: String,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    title: String,
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: String,
}

/// Deserialize one API resource, reporting the raw JSON when it doesn't fit.
fn parse<T: DeserializeOwned>(raw: &Value) -> Result<T> {
    T::deserialize(raw).or_raise(|| ErrorKind::Parse(raw.to_string()))
}

fn parse_video_item(raw: &Value, playlist_id: &str, playlist_name: &str) -> Result<VideoItem> {
    let item: PlaylistItem = parse(raw)?;
    VideoItem::new(item.snippet.resource_id.video_id, item.snippet.title, playlist_id, playlist_name)
        .or_raise(|| ErrorKind::Parse(raw.to_string()))
}

/// YouTube Data API v3 client authenticated with an API key.
///
/// # Examples
///
/// ```no_run
/// use tubevault_youtube::{MetadataProvider, YoutubeProvider};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = YoutubeProvider::new("api-key", "https://www.googleapis.com/youtube/v3");
/// let items = provider.playlist_video_items("PLFgquLnL59alCl_2TQvOiD5Vgm1hCaGSI").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct YoutubeProvider {
    client: Client,
    api_key: String,
    api_url: String,
}

impl YoutubeProvider {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &YoutubeSettings) -> Self {
        Self::new(&settings.api_key, &settings.api_url)
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/{endpoint}", self.api_url))
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .or_raise(|| ErrorKind::Request(endpoint.to_string()))?;
        let status = response.status();
        let body = response.text().await.or_raise(|| ErrorKind::Request(endpoint.to_string()))?;
        if !status.is_success() {
            exn::bail!(ErrorKind::Api(format!("{endpoint} returned {status}: {body}")));
        }
        serde_json::from_str(&body).or_raise(|| ErrorKind::Parse(body.clone()))
    }

    /// Every item of a paginated list endpoint.
    async fn paged(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = params.to_vec();
            query.push(("maxResults", MAX_RESULTS));
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }
            let body = self.get(endpoint, &query).await?;
            let page: Page = parse(&body)?;
            tracing::trace!(endpoint, count = page.items.len(), "Fetched page");
            items.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn playlist_title(&self, playlist_id: &str) -> Result<String> {
        let body = self.get("playlists", &[("part", "snippet"), ("id", playlist_id)]).await?;
        let page: Page = parse(&body)?;
        let Some(raw) = page.items.first() else {
            exn::bail!(ErrorKind::PlaylistNotFound(playlist_id.to_string()));
        };
        let playlist: Playlist = parse(raw)?;
        Ok(playlist.snippet.title)
    }

    async fn items_of(&self, playlist_id: &str, playlist_name: &str) -> Result<Vec<VideoItem>> {
        self.paged("playlistItems", &[("part", "snippet"), ("playlistId", playlist_id)])
            .await?
            .iter()
            .map(|raw| parse_video_item(raw, playlist_id, playlist_name))
            .collect()
    }
}

#[async_trait]
impl MetadataProvider for YoutubeProvider {
    #[instrument(skip(self))]
    async fn playlist_video_items(&self, playlist_id: &str) -> Result<Vec<VideoItem>> {
        let title = self.playlist_title(playlist_id).await?;
        let items = self.items_of(playlist_id, &title).await?;
        tracing::info!(playlist = %title, count = items.len(), "Fetched playlist");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn channel_video_items(&self, channel_id: &str) -> Result<Vec<VideoItem>> {
        let body = self.get("channels", &[("part", "id"), ("id", channel_id)]).await?;
        let page: Page = parse(&body)?;
        if page.items.is_empty() {
            exn::bail!(ErrorKind::ChannelNotFound(channel_id.to_string()));
        }
        let playlists = self.paged("playlists", &[("part", "snippet"), ("channelId", channel_id)]).await?;
        let mut items = Vec::new();
        for raw in &playlists {
            let playlist: Playlist = parse(raw)?;
            items.extend(self.items_of(&playlist.id, &playlist.snippet.title).await?);
        }
        tracing::info!(playlists = playlists.len(), count = items.len(), "Fetched channel");
        Ok(items)
    }
}
