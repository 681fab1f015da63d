//! Video archive model and storage backends.
//!
//! - [`VideoItem`] / [`StoredEntry`]: what gets archived, and what a backend
//!   can tell about what it already holds.
//! - [`sanitize()`]: squeeze untrusted titles into storage-safe names.
//! - [`StorageBackend`]: list and save, implemented for S3, Dropbox and the
//!   local filesystem.
//! - [`StorageRouter`]: pick a shared backend instance by name.

pub mod backend;
pub mod error;
mod models;
mod path;
mod router;
mod sanitize;

pub use crate::backend::{BoxAsyncRead, StorageBackend, VIDEO_EXTENSION};
pub use crate::models::{RawVideoItem, StoredEntry, VideoItem};
pub use crate::path::validate_segment;
pub use crate::router::{BackendKind, StorageRouter};
pub use crate::sanitize::sanitize;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
