use crate::error::{ErrorKind, Result};
use crate::handler::JobHandler;
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use tubevault_queue::{Job, JobQueue, JobStatus};

/// Pulls jobs off the queue and runs them through the [`JobHandler`].
///
/// At most `concurrency` jobs are in flight at once. The queue decides
/// whether a failed job is attempted again.
#[derive(Clone)]
pub struct Worker {
    queue: JobQueue,
    handler: JobHandler,
    concurrency: usize,
}

impl Worker {
    pub fn new(queue: JobQueue, handler: JobHandler, concurrency: usize) -> Self {
        Self {
            queue,
            handler,
            concurrency: concurrency.max(1),
        }
    }

    /// Process jobs until `shutdown` is cancelled, then wait for the jobs
    /// already started to finish.
    ///
    /// Jobs left active by a previous worker that didn't shut down cleanly
    /// are put back in the queue first. Queue errors after that are logged
    /// and retried every poll interval; only `shutdown` ends the loop.
    #[instrument(skip_all, fields(queue = %self.queue.name()))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.queue.requeue_active().await.or_raise(|| ErrorKind::Queue)?;
        tracing::info!(concurrency = self.concurrency, "Worker started");

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let result = loop {
            while let Some(finished) = tasks.try_join_next() {
                log_panic(finished);
            }
            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => permit.or_raise(|| ErrorKind::Queue),
                () = shutdown.cancelled() => break Ok(()),
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(err) => break Err(err),
            };
            let job = match self.queue.next(&shutdown).await.or_raise(|| ErrorKind::Queue) {
                Ok(Some(job)) => job,
                Ok(None) => break Ok(()),
                Err(err) => {
                    tracing::error!(error = ?err, "Failed to fetch next job, backing off");
                    tokio::select! {
                        () = shutdown.cancelled() => break Ok(()),
                        () = tokio::time::sleep(self.queue.poll_interval()) => continue,
                    }
                },
            };
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            tasks.spawn(async move {
                process(&queue, &handler, job).await;
                drop(permit);
            });
        };

        if !tasks.is_empty() {
            tracing::info!(in_flight = tasks.len(), "Waiting for in-flight jobs");
        }
        while let Some(finished) = tasks.join_next().await {
            log_panic(finished);
        }
        tracing::info!("Worker stopped");
        result
    }
}

/// Run one job and report the outcome back to the queue.
async fn process(queue: &JobQueue, handler: &JobHandler, job: Job) {
    let id = job.id;
    tracing::info!(job_id = %id, attempt = job.attempts, "processing job");
    match handler.handle(&job).await {
        Ok(()) => {
            if let Err(err) = queue.complete(id).await {
                tracing::error!(job_id = %id, error = ?err, "Failed to mark job as succeeded");
            }
        },
        Err(err) => match queue.fail(id, &format!("{err:?}")).await {
            Ok(JobStatus::Pending) => tracing::warn!(job_id = %id, "Job failed, will retry"),
            Ok(status) => tracing::warn!(job_id = %id, %status, "Job failed"),
            Err(err) => tracing::error!(job_id = %id, error = ?err, "Failed to mark job as failed"),
        },
    }
}

fn log_panic(finished: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = finished {
        tracing::error!(error = %err, "Job task panicked");
    }
}
