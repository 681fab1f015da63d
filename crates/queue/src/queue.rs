//! Named job queue on top of the SQLite database.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Job, JobCounts, JobEvent, JobId, JobRow, JobStatus};
use exn::ResultExt;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use tubevault_config::QueueSettings;

const EVENT_CAPACITY: usize = 256;

/// Queue behaviour that isn't tied to the database connection.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Name of the queue; jobs of other queues in the same database are invisible.
    pub name: String,
    /// A job that has failed this many attempts is not retried again.
    pub max_attempts: u32,
    /// How often [`JobQueue::next()`] looks for jobs enqueued by other processes.
    pub poll_interval: Duration,
}
impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            name: "backup".to_string(),
            max_attempts: 3,
            poll_interval: Duration::from_millis(1000),
        }
    }
}
impl From<&QueueSettings> for QueueOptions {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            name: settings.name.clone(),
            max_attempts: settings.max_attempts,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }
}

/// Durable job queue.
///
/// Jobs survive restarts; at most one caller can claim a given job, because
/// claiming is a single atomic `UPDATE ... RETURNING`. Cloning is cheap and
/// clones share the same wake-up notifications and event channel.
///
/// # Examples
///
/// ```
/// use tubevault_queue::{Database, JobQueue, QueueOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let db = Database::connect_in_memory().await.unwrap();
/// let queue = JobQueue::new(&db, QueueOptions::default());
/// let id = queue.create_job(&serde_json::json!({"videoId": "dQw4w9WgXcQ"})).await.unwrap();
/// let job = queue.claim_next().await.unwrap().unwrap();
/// assert_eq!(job.id, id);
/// queue.complete(job.id).await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    options: QueueOptions,
    notify: Arc<Notify>,
    events: broadcast::Sender<JobEvent>,
}

impl JobQueue {
    pub fn new(db: &Database, options: QueueOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pool: db.pool().clone(),
            options,
            notify: Arc::new(Notify::new()),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Delay between two looks for new jobs.
    pub fn poll_interval(&self) -> Duration {
        self.options.poll_interval
    }

    fn now() -> i64 {
        UtcDateTime::now().unix_timestamp()
    }

    /// Persist a new pending job.
    pub async fn create_job<T: Serialize + ?Sized>(&self, payload: &T) -> Result<JobId> {
        let payload = serde_json::to_string(payload).or_raise(|| ErrorKind::Payload)?;
        let (id,): (i64,) = sqlx::query_as(include_str!("../queries/insert_job.sql"))
            .bind(&self.options.name)
            .bind(payload)
            .bind(Self::now())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(queue = %self.options.name, job_id = id, "Created job");
        self.notify.notify_one();
        Ok(JobId(id))
    }

    /// Atomically move the oldest pending job to `active` and return it.
    ///
    /// A claimed row that doesn't decode into a [`Job`] is marked `failed`
    /// straight away, without retries, and the next one is claimed instead.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        loop {
            let row: Option<JobRow> = sqlx::query_as(include_str!("../queries/claim_next.sql"))
                .bind(&self.options.name)
                .bind(Self::now())
                .fetch_optional(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
            let Some(row) = row else {
                return Ok(None);
            };
            let id = JobId(row.id);
            match Job::try_from(row) {
                Ok(job) => return Ok(Some(job)),
                Err(err) => self.bury(id, &format!("{err:?}")).await?,
            }
        }
    }

    /// Fail an active job for good, regardless of attempts left.
    async fn bury(&self, id: JobId, error: &str) -> Result<()> {
        tracing::warn!(queue = %self.options.name, job_id = %id, error, "Discarding unreadable job");
        sqlx::query(include_str!("../queries/bury_job.sql"))
            .bind(id.0)
            .bind(error)
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let _ = self.events.send(JobEvent::Failed {
            id,
            error: error.to_string(),
            will_retry: false,
        });
        Ok(())
    }

    /// Wait for the next claimable job.
    ///
    /// Wakes up when a job is created through this queue (or a clone of it)
    /// and otherwise re-checks every poll interval, so jobs enqueued by
    /// another process are picked up too. Returns `None` once `shutdown` is
    /// cancelled.
    pub async fn next(&self, shutdown: &CancellationToken) -> Result<Option<Job>> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(None);
            }
            if let Some(job) = self.claim_next().await? {
                return Ok(Some(job));
            }
            tokio::select! {
                () = shutdown.cancelled() => return Ok(None),
                () = self.notify.notified() => {},
                () = tokio::time::sleep(self.options.poll_interval) => {},
            }
        }
    }

    /// Mark an active job as succeeded.
    #[instrument(skip(self), fields(queue = %self.options.name))]
    pub async fn complete(&self, id: JobId) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/complete_job.sql"))
            .bind(id.0)
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotActive(id.0));
        }
        // No subscribers is fine.
        let _ = self.events.send(JobEvent::Succeeded(id));
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// The job goes back to `pending` while it has attempts left, otherwise
    /// it ends up `failed`. Returns the resulting status.
    #[instrument(skip(self, error), fields(queue = %self.options.name))]
    pub async fn fail(&self, id: JobId, error: &str) -> Result<JobStatus> {
        let row: Option<(String,)> = sqlx::query_as(include_str!("../queries/fail_job.sql"))
            .bind(id.0)
            .bind(error)
            .bind(i64::from(self.options.max_attempts))
            .bind(Self::now())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some((status,)) = row else {
            exn::bail!(ErrorKind::NotActive(id.0));
        };
        let status: JobStatus = status.parse()?;
        let will_retry = status == JobStatus::Pending;
        if will_retry {
            tracing::debug!(job_id = %id, "Job will be retried");
            self.notify.notify_one();
        }
        let _ = self.events.send(JobEvent::Failed {
            id,
            error: error.to_string(),
            will_retry,
        });
        Ok(status)
    }

    pub async fn get(&self, id: JobId) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as(include_str!("../queries/get_job.sql"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match row {
            Some(row) => Job::try_from(row),
            None => exn::bail!(ErrorKind::NotFound(id.0)),
        }
    }

    /// Number of jobs per status.
    pub async fn counts(&self) -> Result<JobCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(include_str!("../queries/count_by_status.sql"))
            .bind(&self.options.name)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut counts = JobCounts::default();
        for (status, total) in rows {
            let total = u64::try_from(total).or_raise(|| ErrorKind::InvalidData("job count"))?;
            counts.add(status.parse()?, total);
        }
        Ok(counts)
    }

    /// Put jobs left `active` by a worker that went away back to `pending`.
    ///
    /// Only safe to call while no worker is running against this queue.
    #[instrument(skip(self), fields(queue = %self.options.name))]
    pub async fn requeue_active(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/requeue_active.sql"))
            .bind(&self.options.name)
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let requeued = result.rows_affected();
        if requeued > 0 {
            tracing::info!(requeued, "Recovered jobs stranded as active");
            self.notify.notify_one();
        }
        Ok(requeued)
    }

    /// Receive an event for every finished job attempt from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn queue(max_attempts: u32) -> JobQueue {
        let db = Database::connect_in_memory().await.unwrap();
        JobQueue::new(
            &db,
            QueueOptions {
                max_attempts,
                ..QueueOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_claim_in_creation_order() {
        let queue = queue(3).await;
        let first = queue.create_job(&json!({"videoId": "a"})).await.unwrap();
        let second = queue.create_job(&json!({"videoId": "b"})).await.unwrap();
        let job = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(job.id, first);
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.payload, json!({"videoId": "a"}));
        assert_eq!(queue.claim_next().await.unwrap().unwrap().id, second);
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete() {
        let queue = queue(3).await;
        let mut events = queue.subscribe();
        let id = queue.create_job(&json!({})).await.unwrap();
        queue.claim_next().await.unwrap();
        queue.complete(id).await.unwrap();
        assert_eq!(queue.get(id).await.unwrap().status, JobStatus::Succeeded);
        assert_eq!(events.recv().await.unwrap(), JobEvent::Succeeded(id));
        // Only active jobs can complete.
        let err = queue.complete(id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotActive(_)));
    }

    #[tokio::test]
    async fn test_fail_retries_until_max_attempts() {
        let queue = queue(2).await;
        let mut events = queue.subscribe();
        let id = queue.create_job(&json!({})).await.unwrap();

        queue.claim_next().await.unwrap().unwrap();
        assert_eq!(queue.fail(id, "first").await.unwrap(), JobStatus::Pending);
        assert_eq!(
            events.recv().await.unwrap(),
            JobEvent::Failed {
                id,
                error: "first".to_string(),
                will_retry: true
            }
        );

        let retried = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(retried.attempts, 2);
        assert_eq!(retried.error.as_deref(), Some("first"));
        assert_eq!(queue.fail(id, "second").await.unwrap(), JobStatus::Failed);

        let job = queue.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("second"));
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_row_is_failed_and_skipped() {
        let db = Database::connect_in_memory().await.unwrap();
        let queue = JobQueue::new(&db, QueueOptions::default());
        let mut events = queue.subscribe();
        sqlx::query(
            "INSERT INTO jobs (queue, payload, status, attempts, created_at, updated_at) \
             VALUES ('backup', '{not json', 'pending', 0, 0, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let good = queue.create_job(&json!({"videoId": "a"})).await.unwrap();

        assert_eq!(queue.claim_next().await.unwrap().unwrap().id, good);
        assert!(matches!(events.recv().await.unwrap(), JobEvent::Failed { will_retry: false, .. }));
        let counts = queue.counts().await.unwrap();
        assert_eq!((counts.pending, counts.active, counts.failed), (0, 1, 1));
        // Not picked up again by recovery either.
        assert_eq!(queue.requeue_active().await.unwrap(), 1);
        assert_eq!(queue.claim_next().await.unwrap().unwrap().id, good);
    }

    #[tokio::test]
    async fn test_counts_and_requeue() {
        let queue = queue(3).await;
        for video_id in ["a", "b", "c"] {
            queue.create_job(&json!({ "videoId": video_id })).await.unwrap();
        }
        let done = queue.claim_next().await.unwrap().unwrap();
        queue.complete(done.id).await.unwrap();
        queue.claim_next().await.unwrap().unwrap();
        assert_eq!(
            queue.counts().await.unwrap(),
            JobCounts {
                pending: 1,
                active: 1,
                succeeded: 1,
                failed: 0
            }
        );
        assert_eq!(queue.requeue_active().await.unwrap(), 1);
        let counts = queue.counts().await.unwrap();
        assert_eq!((counts.pending, counts.active), (2, 0));
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let db = Database::connect_in_memory().await.unwrap();
        let backup = JobQueue::new(&db, QueueOptions::default());
        let other = JobQueue::new(
            &db,
            QueueOptions {
                name: "other".to_string(),
                ..QueueOptions::default()
            },
        );
        backup.create_job(&json!({})).await.unwrap();
        assert!(other.claim_next().await.unwrap().is_none());
        assert_eq!(other.counts().await.unwrap().total(), 0);
        assert!(backup.claim_next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_next_wakes_on_create() {
        let queue = queue(3).await;
        let shutdown = CancellationToken::new();
        let producer = queue.clone();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            producer.create_job(&json!({"videoId": "late"})).await.unwrap()
        });
        let job = queue.next(&shutdown).await.unwrap().unwrap();
        assert_eq!(job.id, handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_next_returns_none_on_shutdown() {
        let queue = queue(3).await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(queue.next(&shutdown).await.unwrap().is_none());
    }
}
