use crate::error::{Error, ErrorKind};
use derive_more::Display;
use exn::ResultExt;
use std::str::FromStr;
use time::UtcDateTime;

/// Row id of a job.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub i64);

/// Lifecycle: `pending → active → succeeded | failed`, with `active →
/// pending` when a failed attempt is retried.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[display("pending")]
    Pending,
    #[display("active")]
    Active,
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
}
impl FromStr for JobStatus {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(ErrorKind::InvalidData("job status")),
        }
    }
}

/// A job as stored in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    /// Arbitrary JSON; interpreting it is up to the job handler.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Number of times the job has been claimed.
    pub attempts: u32,
    /// Error message of the most recent failed attempt.
    pub error: Option<String>,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

/// Emitted whenever a job attempt finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Succeeded(JobId),
    Failed {
        id: JobId,
        error: String,
        /// Whether the job went back to `pending` for another attempt.
        will_retry: bool,
    },
}

/// Number of jobs per status in one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: u64,
    pub active: u64,
    pub succeeded: u64,
    pub failed: u64,
}
impl JobCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.active + self.succeeded + self.failed
    }

    pub(crate) fn add(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Active => self.active += count,
            JobStatus::Succeeded => self.succeeded += count,
            JobStatus::Failed => self.failed += count,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct JobRow {
    pub(crate) id: i64,
    queue: String,
    payload: String,
    status: String,
    attempts: i64,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
}
impl TryFrom<JobRow> for Job {
    type Error = Error;
    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: JobId(row.id),
            queue: row.queue,
            payload: serde_json::from_str(&row.payload).or_raise(|| ErrorKind::InvalidData("payload"))?,
            status: row.status.parse::<JobStatus>()?,
            attempts: u32::try_from(row.attempts).or_raise(|| ErrorKind::InvalidData("attempts"))?,
            error: row.error,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("update date"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(status: &str, payload: &str) -> JobRow {
        JobRow {
            id: 3,
            queue: "backup".to_string(),
            payload: payload.to_string(),
            status: status.to_string(),
            attempts: 1,
            error: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_060,
        }
    }

    #[rstest]
    #[case("pending", JobStatus::Pending)]
    #[case("active", JobStatus::Active)]
    #[case("succeeded", JobStatus::Succeeded)]
    #[case("failed", JobStatus::Failed)]
    fn test_status_round_trip(#[case] text: &str, #[case] status: JobStatus) {
        assert_eq!(text.parse::<JobStatus>().unwrap(), status);
        assert_eq!(status.to_string(), text);
    }

    #[test]
    fn test_row_to_model() {
        let job = Job::try_from(row("active", r#"{"videoId":"a"}"#)).unwrap();
        assert_eq!(job.id, JobId(3));
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.payload["videoId"], "a");
        assert_eq!(job.updated_at.unix_timestamp() - job.created_at.unix_timestamp(), 60);
    }

    #[test]
    fn test_row_with_bad_status() {
        let err = Job::try_from(row("exploded", "{}")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("job status")));
    }

    #[test]
    fn test_row_with_bad_payload() {
        let err = Job::try_from(row("pending", "{not json")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("payload")));
    }

    #[test]
    fn test_counts() {
        let mut counts = JobCounts::default();
        counts.add(JobStatus::Pending, 2);
        counts.add(JobStatus::Failed, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.pending, 2);
    }
}
