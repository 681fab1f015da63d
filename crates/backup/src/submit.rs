use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;
use tubevault_queue::{JobId, JobQueue};
use tubevault_storage::{BackendHandle, StoredEntry, VideoItem, sanitize};
use tubevault_youtube::MetadataProvider;

/// Turns a playlist into one queued job per video that isn't archived yet.
///
/// Steps run strictly in order: fetch, sanitize, diff against the archive,
/// enqueue. Jobs are created in the order the provider returned the videos.
/// A failure stops the run; jobs created before it stay queued.
#[derive(Clone)]
pub struct Submitter {
    provider: Arc<dyn MetadataProvider>,
    backend: BackendHandle,
    queue: JobQueue,
}

impl Submitter {
    pub fn new(provider: Arc<dyn MetadataProvider>, backend: BackendHandle, queue: JobQueue) -> Self {
        Self { provider, backend, queue }
    }

    /// Queue every video of the playlist that isn't archived yet.
    #[instrument(skip(self))]
    pub async fn run(&self, playlist_id: &str) -> Result<Vec<JobId>> {
        self.run_inner(playlist_id).await.or_raise(|| ErrorKind::Playlist(playlist_id.to_string()))
    }

    async fn run_inner(&self, playlist_id: &str) -> Result<Vec<JobId>> {
        let items = self.provider.playlist_video_items(playlist_id).await.or_raise(|| ErrorKind::Provider)?;
        self.backup_videos(items).await
    }

    /// Sanitize, diff and enqueue already-fetched items.
    pub async fn backup_videos(&self, items: Vec<VideoItem>) -> Result<Vec<JobId>> {
        let fetched = items.len();
        let missing = self.missing(items).await?;
        let mut jobs = Vec::with_capacity(missing.len());
        for item in &missing {
            let id =
                self.queue.create_job(item).await.or_raise(|| ErrorKind::Enqueue(item.video_id().to_string()))?;
            tracing::debug!(job_id = %id, video_id = item.video_id(), "Enqueued video");
            jobs.push(id);
        }
        tracing::info!(backend = self.backend.name(), fetched, enqueued = jobs.len(), "Submitted backup jobs");
        Ok(jobs)
    }

    /// Sanitized items that aren't archived yet.
    ///
    /// An empty input returns straight away without listing the archive.
    pub async fn missing(&self, items: Vec<VideoItem>) -> Result<Vec<VideoItem>> {
        let items: Vec<VideoItem> = items.into_iter().map(|item| item.map_names(sanitize)).collect();
        if items.is_empty() {
            return Ok(items);
        }
        let existing = self.backend.list_all().await.or_raise(|| ErrorKind::Inventory)?;
        Ok(not_archived(items, &existing))
    }
}

/// Items with no archived entry of the same `(playlistName, videoName)`.
///
/// Video ids are not compared: a new upload under an archived title counts
/// as archived.
pub fn not_archived(items: Vec<VideoItem>, existing: &[StoredEntry]) -> Vec<VideoItem> {
    let archived: HashSet<(&str, &str)> = existing.iter().map(StoredEntry::key).collect();
    items.into_iter().filter(|item| !archived.contains(&(item.playlist_name(), item.video_name()))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubevault_queue::{Database, QueueOptions};
    use tubevault_storage::backend::MockBackend;
    use tubevault_youtube::mock::MockProvider;

    fn item(id: &str, name: &str) -> VideoItem {
        VideoItem::new(id, name, "PL1", "P").unwrap()
    }

    async fn submitter(provider: MockProvider, backend: Arc<MockBackend>) -> (Submitter, JobQueue) {
        let db = Database::connect_in_memory().await.unwrap();
        let queue = JobQueue::new(&db, QueueOptions::default());
        (Submitter::new(Arc::new(provider), backend, queue.clone()), queue)
    }

    #[test]
    fn test_not_archived_compares_names_only() {
        let existing = [StoredEntry::new(None, "V1", "P")];
        let fetched = vec![item("a", "V1"), item("b", "V2")];
        let missing = not_archived(fetched, &existing);
        assert_eq!(missing, vec![item("b", "V2")]);

        let reuploaded = vec![item("new-id", "V1")];
        assert!(not_archived(reuploaded, &existing).is_empty());

        let other_playlist = vec![VideoItem::new("a", "V1", "PL2", "Q").unwrap()];
        assert_eq!(not_archived(other_playlist.clone(), &existing), other_playlist);
    }

    #[tokio::test]
    async fn test_enqueues_only_missing_items() {
        let backend = Arc::new(MockBackend::with_entries([StoredEntry::new(None, "V1", "P")]));
        let provider =
            MockProvider::default().with_playlist("PL1", [item("a", "V1"), item("b", "V2"), item("c", "V3")]);
        let (submitter, queue) = submitter(provider, Arc::clone(&backend)).await;

        let jobs = submitter.run("PL1").await.unwrap();
        assert_eq!(jobs.len(), 2);
        let first = queue.get(jobs[0]).await.unwrap();
        assert_eq!(first.payload["videoId"], "b");
        assert_eq!(first.payload["playlistName"], "P");
        let second = queue.get(jobs[1]).await.unwrap();
        assert_eq!(second.payload["videoId"], "c");
        assert_eq!(queue.counts().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_empty_playlist_skips_listing() {
        let backend = Arc::new(MockBackend::default());
        let provider = MockProvider::default().with_playlist("PL1", []);
        let (submitter, queue) = submitter(provider, Arc::clone(&backend)).await;

        assert!(submitter.run("PL1").await.unwrap().is_empty());
        assert_eq!(backend.list_calls(), 0);
        assert_eq!(queue.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_names_are_sanitized_before_diffing() {
        let backend = Arc::new(MockBackend::with_entries([StoredEntry::new(None, "AC-DC", "Rock")]));
        let provider = MockProvider::default().with_playlist(
            "PL1",
            [
                VideoItem::new("a", "AC/DC", "PL1", "Rock").unwrap(),
                VideoItem::new("b", "Café", "PL1", "Rock").unwrap(),
            ],
        );
        let (submitter, queue) = submitter(provider, backend).await;

        let jobs = submitter.run("PL1").await.unwrap();
        assert_eq!(jobs.len(), 1);
        let job = queue.get(jobs[0]).await.unwrap();
        assert_eq!(job.payload["videoName"], "Cafe");
    }

    #[tokio::test]
    async fn test_listing_failure_fails_the_run() {
        let backend = Arc::new(MockBackend::default());
        backend.insert_malformed("P/garbage").await;
        let provider = MockProvider::default().with_playlist("PL1", [item("a", "V1")]);
        let (submitter, queue) = submitter(provider, backend).await;

        let err = submitter.run("PL1").await.unwrap_err();
        assert_eq!((*err).to_string(), "Failed to backup playlist PL1");
        assert_eq!(queue.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_unknown_playlist() {
        let (submitter, _queue) = submitter(MockProvider::default(), Arc::new(MockBackend::default())).await;
        let err = submitter.run("PL404").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Playlist(id) if id == "PL404"));
    }
}
