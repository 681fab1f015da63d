//! In-memory storage backend for testing.

use super::{BoxAsyncRead, StoredEntryStream};
use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, StoredEntry, VideoItem};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Saved videos are kept in a map keyed by `(playlistName, videoName)`
/// behind a [`RwLock`], so all trait methods can operate on `&self`. Every
/// call to [`list_stream()`](StorageBackend::list_stream) is counted, which
/// lets tests assert that a listing was (or wasn't) performed.
///
/// # Examples
///
/// ```
/// use tubevault_storage::backend::{MockBackend, StorageBackend};
/// use tubevault_storage::StoredEntry;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_entries([StoredEntry::new(None, "Song", "Playlist")]);
/// assert_eq!(backend.list_all().await.unwrap().len(), 1);
/// assert_eq!(backend.list_calls(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<(String, String), (StoredEntry, Vec<u8>)>>,
    malformed: RwLock<Vec<String>>,
    list_calls: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with (empty) archived videos.
    pub fn with_entries(entries: impl IntoIterator<Item = StoredEntry>) -> Self {
        let storage = entries
            .into_iter()
            .map(|entry| ((entry.playlist_name.clone(), entry.video_name.clone()), (entry, Vec::new())))
            .collect();
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(storage),
            malformed: RwLock::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a raw key that doesn't follow any naming convention; listing
    /// will fail while it is present.
    pub async fn insert_malformed(&self, key: impl Into<String>) {
        self.malformed.write().await.push(key.into());
    }

    /// Remove an archived video, returning whether it existed.
    pub async fn remove(&self, playlist_name: &str, video_name: &str) -> bool {
        self.storage.write().await.remove(&(playlist_name.to_string(), video_name.to_string())).is_some()
    }

    /// Contents written for an archived video, if any.
    pub async fn saved(&self, playlist_name: &str, video_name: &str) -> Option<Vec<u8>> {
        let guard = self.storage.read().await;
        guard.get(&(playlist_name.to_string(), video_name.to_string())).map(|(_, data)| data.clone())
    }

    /// Number of archived videos.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// How many times the archive has been listed.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::with_entries([])
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> StoredEntryStream<'_> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding to
            // avoid holding the lock across yield points.
            let (entries, malformed): (Vec<StoredEntry>, Vec<String>) = {
                let guard = self.storage.read().await;
                let malformed = self.malformed.read().await;
                (guard.values().map(|(entry, _)| entry.clone()).collect(), malformed.clone())
            };
            for entry in entries {
                yield Ok(entry);
            }
            for key in malformed {
                yield Err(exn::Exn::from(ErrorKind::MalformedEntry(key)));
            }
        })
    }

    async fn store(&self, mut reader: BoxAsyncRead, item: &VideoItem) -> Result<()> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.map_err(ErrorKind::Io)?;
        let key = (item.playlist_name().to_string(), item.video_name().to_string());
        self.storage.write().await.insert(key, (StoredEntry::from(item), data));
        Ok(())
    }
}
