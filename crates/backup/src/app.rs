use crate::error::{ErrorKind, Result};
use crate::{Backup, JobHandler, Submitter, Worker};
use exn::ResultExt;
use std::sync::Arc;
use tubevault_config::{Config, DownloadSettings, QueueSettings, WorkerSettings, YoutubeSettings};
use tubevault_queue::{Database, JobQueue, QueueOptions};
use tubevault_storage::{BackendHandle, StorageRouter};
use tubevault_youtube::{Downloader, MetadataProvider, YoutubeProvider, YtDlpDownloader};

/// Everything the pipeline needs, built once from configuration and passed
/// on explicitly.
pub struct App {
    config: Config,
    router: StorageRouter,
    backend: BackendHandle,
    db: Database,
    queue: JobQueue,
    downloader: Arc<dyn Downloader>,
    concurrency: usize,
}

impl App {
    /// Build the application from configuration.
    ///
    /// `storage` overrides `storage.backend`. The YouTube API key is only
    /// required once [`backup()`](Self::backup) is called, so processing the
    /// queue works without one.
    pub async fn from_config(config: Config, storage: Option<&str>) -> Result<Self> {
        let router = StorageRouter::new(config.clone());
        let backend = match storage {
            Some(name) => router.get(name).await,
            None => router.default_backend().await,
        }
        .or_raise(|| ErrorKind::Config("storage"))?;

        let queue_settings: QueueSettings = config.section().or_raise(|| ErrorKind::Config("queue"))?;
        let db = Database::connect(&queue_settings.database).await.or_raise(|| ErrorKind::Queue)?;
        let queue = JobQueue::new(&db, QueueOptions::from(&queue_settings));

        let download: DownloadSettings = config.section().or_raise(|| ErrorKind::Config("download"))?;
        let worker: WorkerSettings = config.section().or_raise(|| ErrorKind::Config("worker"))?;
        tracing::debug!(backend = backend.name(), queue = queue.name(), "Application ready");

        Ok(Self {
            config,
            router,
            backend,
            db,
            queue,
            downloader: Arc::new(YtDlpDownloader::from_settings(&download)),
            concurrency: worker.concurrency,
        })
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn router(&self) -> &StorageRouter {
        &self.router
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn handler(&self) -> JobHandler {
        JobHandler::new(Arc::clone(&self.downloader), Arc::clone(&self.backend))
    }

    /// Backup entry points, talking to the YouTube Data API.
    pub fn backup(&self) -> Result<Backup> {
        let youtube: YoutubeSettings = self.config.section().or_raise(|| ErrorKind::Config("youtube"))?;
        let provider: Arc<dyn MetadataProvider> = Arc::new(YoutubeProvider::from_settings(&youtube));
        let submitter = Submitter::new(Arc::clone(&provider), Arc::clone(&self.backend), self.queue.clone());
        Ok(Backup::new(provider, submitter, self.handler()))
    }

    pub fn worker(&self) -> Worker {
        Worker::new(self.queue.clone(), self.handler(), self.concurrency)
    }

    /// Compact the queue database and close its connections.
    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, extra: &str) -> Config {
        let root = dir.path().display().to_string().replace('\\', "/");
        Config::from_toml_str(&format!(
            r#"
            [storage]
            backend = "local"
            [storage.local]
            directory = "{root}/archive"
            [queue]
            database = "{root}/queue.sqlite"
            {extra}
            "#
        ))
    }

    #[tokio::test]
    async fn test_from_config() {
        let dir = TempDir::new().unwrap();
        let app = App::from_config(config(&dir, ""), None).await.unwrap();
        assert_eq!(app.backend().name(), "local");
        assert_eq!(app.queue().name(), "backup");
        assert!(dir.path().join("archive").is_dir());
        assert!(dir.path().join("queue.sqlite").exists());
        app.close().await;
        assert!(app.db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_backup_requires_api_key() {
        let dir = TempDir::new().unwrap();
        let app = App::from_config(config(&dir, ""), None).await.unwrap();
        let err = app.backup().err().unwrap();
        assert!(matches!(&*err, ErrorKind::Config("youtube")));

        let app = App::from_config(config(&dir, "[youtube]\napi_key = \"secret\""), None).await.unwrap();
        assert!(app.backup().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_storage_override() {
        let dir = TempDir::new().unwrap();
        let err = App::from_config(config(&dir, ""), Some("carrier-pigeon")).await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Config("storage")));
    }
}
