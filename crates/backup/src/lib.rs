//! Playlist and channel backup pipeline.
//!
//! ```text
//! id ─► MetadataProvider ─► sanitize ─► diff vs. StorageBackend::list_all ─► JobQueue
//!                                                                           │
//!                      StorageBackend::save ◄─ Downloader ◄─ JobHandler ◄─ Worker
//! ```
//!
//! - [`Submitter`]: fetch, sanitize, diff and enqueue one job per missing video.
//! - [`Backup`]: playlist and channel entry points, plus the direct
//!   (non-queued) mode.
//! - [`JobHandler`] / [`Worker`]: perform queued jobs.
//! - [`App`]: builds all of the above from configuration.

mod app;
mod backup;
mod direct;
pub mod error;
mod handler;
mod submit;
mod worker;

pub use crate::app::App;
pub use crate::backup::Backup;
pub use crate::direct::backup_immediately;
pub use crate::handler::JobHandler;
pub use crate::submit::{Submitter, not_archived};
pub use crate::worker::Worker;
