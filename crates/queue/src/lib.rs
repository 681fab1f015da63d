//! Durable job queue backed by SQLite.
//!
//! Jobs carry a JSON payload and move through
//! `pending → active → succeeded | failed`. A job that fails while it still
//! has attempts left goes back to `pending`. Jobs that were `active` when a
//! process died can be recovered with [`JobQueue::requeue_active()`].

mod db;
pub mod error;
mod models;
mod queue;

pub use crate::db::Database;
pub use crate::models::{Job, JobCounts, JobEvent, JobId, JobStatus};
pub use crate::queue::{JobQueue, QueueOptions};
