use crate::direct::backup_immediately;
use crate::error::{Error, ErrorKind, Result};
use crate::handler::JobHandler;
use crate::submit::Submitter;
use exn::ResultExt;
use std::sync::Arc;
use tracing::instrument;
use tubevault_queue::JobId;
use tubevault_storage::VideoItem;
use tubevault_youtube::MetadataProvider;

/// Entry point for backing up a playlist or a whole channel.
///
/// The queued operations only submit jobs; a [`Worker`](crate::Worker)
/// performs them. [`playlist_immediately()`](Self::playlist_immediately)
/// does the downloads itself instead.
#[derive(Clone)]
pub struct Backup {
    provider: Arc<dyn MetadataProvider>,
    submitter: Submitter,
    handler: JobHandler,
}

impl Backup {
    pub fn new(provider: Arc<dyn MetadataProvider>, submitter: Submitter, handler: JobHandler) -> Self {
        Self {
            provider,
            submitter,
            handler,
        }
    }

    /// Queue every video of a playlist that isn't archived yet.
    #[instrument(skip(self))]
    pub async fn backup_playlist(&self, playlist_id: &str) -> Result<Vec<JobId>> {
        self.backup_playlist_inner(playlist_id).await.or_raise(|| ErrorKind::Playlist(playlist_id.to_string()))
    }

    async fn backup_playlist_inner(&self, playlist_id: &str) -> Result<Vec<JobId>> {
        let items = self.provider.playlist_video_items(playlist_id).await.or_raise(|| ErrorKind::Provider)?;
        self.submitter.backup_videos(items).await
    }

    /// Queue every video of every playlist of a channel that isn't archived yet.
    #[instrument(skip(self))]
    pub async fn backup_channel(&self, channel_id: &str) -> Result<Vec<JobId>> {
        self.backup_channel_inner(channel_id).await.or_raise(|| ErrorKind::Channel(channel_id.to_string()))
    }

    async fn backup_channel_inner(&self, channel_id: &str) -> Result<Vec<JobId>> {
        let items = self.provider.channel_video_items(channel_id).await.or_raise(|| ErrorKind::Provider)?;
        self.submitter.backup_videos(items).await
    }

    /// Download every video of a playlist that isn't archived yet, right now
    /// and all at once.
    ///
    /// Only fetching the playlist or listing the archive fails the call;
    /// failures of individual videos are returned instead.
    #[instrument(skip(self))]
    pub async fn playlist_immediately(&self, playlist_id: &str) -> Result<Vec<Error>> {
        let missing =
            self.missing_in_playlist(playlist_id).await.or_raise(|| ErrorKind::Playlist(playlist_id.to_string()))?;
        tracing::info!(count = missing.len(), "Backing up videos directly");
        Ok(backup_immediately(&self.handler, &missing).await)
    }

    async fn missing_in_playlist(&self, playlist_id: &str) -> Result<Vec<VideoItem>> {
        let items = self.provider.playlist_video_items(playlist_id).await.or_raise(|| ErrorKind::Provider)?;
        self.submitter.missing(items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubevault_queue::{Database, JobQueue, QueueOptions};
    use tubevault_storage::backend::MockBackend;
    use tubevault_storage::StoredEntry;
    use tubevault_youtube::mock::{MockDownloader, MockProvider};

    async fn backup(
        provider: MockProvider,
        backend: &Arc<MockBackend>,
        downloader: MockDownloader,
    ) -> (Backup, JobQueue) {
        let db = Database::connect_in_memory().await.unwrap();
        let queue = JobQueue::new(&db, QueueOptions::default());
        let provider: Arc<dyn MetadataProvider> = Arc::new(provider);
        let submitter = Submitter::new(Arc::clone(&provider), backend.clone(), queue.clone());
        let handler = JobHandler::new(Arc::new(downloader), backend.clone());
        (Backup::new(provider, submitter, handler), queue)
    }

    fn channel() -> MockProvider {
        MockProvider::default()
            .with_playlist("PL1", [VideoItem::new("a", "V1", "PL1", "First").unwrap()])
            .with_playlist(
                "PL2",
                [
                    VideoItem::new("b", "V1", "PL2", "Second").unwrap(),
                    VideoItem::new("c", "V2", "PL2", "Second").unwrap(),
                ],
            )
            .with_channel("UC1", ["PL1", "PL2"])
    }

    #[tokio::test]
    async fn test_backup_channel_covers_all_playlists() {
        let backend = Arc::new(MockBackend::with_entries([StoredEntry::new(None, "V2", "Second")]));
        let (backup, queue) = backup(channel(), &backend, MockDownloader::default()).await;

        let jobs = backup.backup_channel("UC1").await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(queue.get(jobs[0]).await.unwrap().payload["videoId"], "a");
        assert_eq!(queue.get(jobs[1]).await.unwrap().payload["videoId"], "b");
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let backend = Arc::new(MockBackend::default());
        let (backup, _queue) = backup(channel(), &backend, MockDownloader::default()).await;

        let err = backup.backup_channel("UC404").await.unwrap_err();
        assert_eq!((*err).to_string(), "Failed to backup channel UC404");
    }

    #[tokio::test]
    async fn test_unknown_playlist() {
        let backend = Arc::new(MockBackend::default());
        let (backup, _queue) = backup(channel(), &backend, MockDownloader::default()).await;

        let err = backup.backup_playlist("PL404").await.unwrap_err();
        assert_eq!((*err).to_string(), "Failed to backup playlist PL404");
    }

    #[tokio::test]
    async fn test_playlist_immediately_reports_failures() {
        let backend = Arc::new(MockBackend::with_entries([StoredEntry::new(None, "V2", "Second")]));
        let (backup, queue) = backup(channel(), &backend, MockDownloader::default().failing_for("b")).await;

        let errors = backup.playlist_immediately("PL2").await.unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&*errors[0], ErrorKind::Video(id) if id == "b"));
        assert_eq!(queue.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_playlist_immediately_saves_missing_videos() {
        let backend = Arc::new(MockBackend::default());
        let (backup, _queue) = backup(channel(), &backend, MockDownloader::default()).await;

        assert!(backup.playlist_immediately("PL2").await.unwrap().is_empty());
        assert_eq!(backend.saved("Second", "V2").await, Some(MockDownloader::content("c")));
        assert_eq!(backend.len().await, 2);
    }
}
