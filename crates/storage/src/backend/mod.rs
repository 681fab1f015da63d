//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait: the two capabilities the
//! backup pipeline needs from an archive, regardless of where it lives.
//!
//! - **list**: reconstruct what is already archived purely from the
//!   backend's own naming convention (no side index is kept anywhere).
//! - **save**: stream one video into the archive under a key derived from
//!   its [`VideoItem`].
//!
//! | Backend          | Layout                                            |
//! |------------------|---------------------------------------------------|
//! | [`S3Backend`]    | `{playlistName}/{videoName} ({videoId}).mp4`       |
//! | [`DropboxBackend`] | `/{playlistName}/{videoName} ({videoId}).mp4`    |
//! | [`LocalBackend`] | `{root}/{playlistName}/{videoName}_{videoId}.{ext}` |

#[cfg(feature = "dropbox")]
mod dropbox;
mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "dropbox")]
pub use self::dropbox::DropboxBackend;
pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::{ErrorKind, Result};
use crate::models::{StoredEntry, VideoItem};
use async_trait::async_trait;
use exn::ResultExt;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

pub(crate) type StoredEntryStream<'a> = Pin<Box<dyn Stream<Item = Result<StoredEntry>> + Send + 'a>>;
/// Byte stream of one downloaded video.
pub type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// File extension used for every video written by the backup pipeline.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Size of one upload chunk for backends that upload in parts.
#[cfg_attr(not(any(feature = "s3", feature = "dropbox")), allow(dead_code))]
pub(crate) const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Unified interface for storage backends.
///
/// Backend instances are shared process-wide (see
/// [`StorageRouter`](crate::StorageRouter)), so every method takes `&self`
/// and concurrent calls must be safe to interleave.
///
/// Implementors provide [`list_stream()`](Self::list_stream) and
/// [`store()`](Self::store); callers use [`list_all()`](Self::list_all) and
/// [`save()`](Self::save), which add the error context.
///
/// # Examples
///
/// ```
/// use tubevault_storage::{StorageBackend, VideoItem, error::Result};
///
/// async fn is_archived(backend: &dyn StorageBackend, item: &VideoItem) -> Result<bool> {
///     let existing = backend.list_all().await?;
///     Ok(existing.iter().any(|e| e.key() == (item.playlist_name(), item.video_name())))
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend (`s3`, `dropbox`, `local`, ...), used for logging.
    fn name(&self) -> &str;

    /// Enumerate everything currently archived.
    ///
    /// Fails with [`ErrorKind::List`] if the underlying listing call fails
    /// **or** if any single entry doesn't follow the naming convention: a
    /// partial inventory would make deduplication lie, so there is no
    /// skip-and-continue mode.
    async fn list_all(&self) -> Result<Vec<StoredEntry>> {
        let entries: Vec<StoredEntry> =
            self.list_stream().try_collect().await.or_raise(|| ErrorKind::List(self.name().to_string()))?;
        tracing::debug!(backend = self.name(), count = entries.len(), "Listed archive contents");
        Ok(entries)
    }

    /// Stream archive entries as the backend discovers them.
    ///
    /// Malformed entries are yielded as [`ErrorKind::MalformedEntry`] errors.
    fn list_stream(&self) -> StoredEntryStream<'_>;

    /// Write the full contents of `reader` as the archived copy of `item`.
    ///
    /// Resolves only once the data is completely written. Failures are
    /// raised as [`ErrorKind::Save`] annotated with the serialized item.
    async fn save(&self, reader: BoxAsyncRead, item: &VideoItem) -> Result<()> {
        self.store(reader, item).await.or_raise(|| ErrorKind::Save(item.to_json()))?;
        tracing::debug!(backend = self.name(), video_id = item.video_id(), "Saved video");
        Ok(())
    }

    /// Backend-specific write; see [`save()`](Self::save).
    async fn store(&self, reader: BoxAsyncRead, item: &VideoItem) -> Result<()>;
}

/// Read up to `size` bytes, stopping early only at end-of-stream.
///
/// A returned chunk shorter than `size` means the stream is exhausted.
#[cfg_attr(not(any(feature = "s3", feature = "dropbox")), allow(dead_code))]
pub(crate) async fn read_chunk(reader: &mut BoxAsyncRead, size: usize) -> Result<Vec<u8>> {
    let mut chunk = Vec::with_capacity(size);
    let mut limited = (&mut *reader).take(size as u64);
    limited.read_to_end(&mut chunk).await.map_err(ErrorKind::Io)?;
    Ok(chunk)
}
