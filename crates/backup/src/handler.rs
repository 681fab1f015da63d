use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::sync::Arc;
use tracing::instrument;
use tubevault_queue::Job;
use tubevault_storage::{BackendHandle, RawVideoItem, VideoItem};
use tubevault_youtube::{Downloader, watch_url};

/// Downloads the video a job refers to and writes it to storage.
///
/// The handler never retries; a failed [`handle()`](Self::handle) is reported
/// to the queue, which decides whether the job gets another attempt.
#[derive(Clone)]
pub struct JobHandler {
    downloader: Arc<dyn Downloader>,
    backend: BackendHandle,
}

impl JobHandler {
    pub fn new(downloader: Arc<dyn Downloader>, backend: BackendHandle) -> Self {
        Self { downloader, backend }
    }

    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn handle(&self, job: &Job) -> Result<()> {
        let item = video_item(job)?;
        self.backup_video(&item).await
    }

    /// Download one video and save it, logging the outcome.
    pub async fn backup_video(&self, item: &VideoItem) -> Result<()> {
        let video_id = item.video_id();
        match self.download_and_save(item).await.or_raise(|| ErrorKind::Video(video_id.to_string())) {
            Ok(()) => {
                tracing::info!(video_id, playlist = item.playlist_name(), "Backed up video");
                Ok(())
            },
            Err(err) => {
                tracing::error!(video_id, error = ?err, "Failed to back up video");
                Err(err)
            },
        }
    }

    async fn download_and_save(&self, item: &VideoItem) -> Result<()> {
        let url = watch_url(item.video_id()).or_raise(|| ErrorKind::Download)?;
        let reader = self.downloader.download(&url).await.or_raise(|| ErrorKind::Download)?;
        self.backend.save(reader, item).await.or_raise(|| ErrorKind::Save)
    }
}

/// The video item carried by a job's payload.
///
/// A payload without a `videoId` is rejected outright; any other missing key
/// surfaces as the storage layer's "Invalid videoItem" error.
fn video_item(job: &Job) -> Result<VideoItem> {
    let invalid = || ErrorKind::InvalidJob(job.payload.to_string());
    if job.payload.get("videoId").is_none() {
        exn::bail!(invalid());
    }
    let raw: RawVideoItem = serde_json::from_value(job.payload.clone()).or_raise(invalid)?;
    VideoItem::try_from(raw).or_raise(invalid)
}
