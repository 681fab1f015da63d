//! YouTube integration: where video metadata comes from, and how videos are
//! fetched.
//!
//! - [`MetadataProvider`]: playlist and channel contents as
//!   [`VideoItem`](tubevault_storage::VideoItem)s; [`YoutubeProvider`] talks
//!   to the YouTube Data API v3.
//! - [`Downloader`]: turns a [`watch_url()`] into a byte stream;
//!   [`YtDlpDownloader`] streams the output of `yt-dlp`.

mod download;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
mod provider;
mod url;

pub use crate::download::{Downloader, ProcessReader, YtDlpDownloader};
pub use crate::provider::{MetadataProvider, YoutubeProvider};
pub use crate::url::watch_url;
pub use reqwest::Url;
