//! Typed configuration sections.
//!
//! Each section knows its own dotted path and how to validate itself, so
//! consumers can call [`Config::section()`](crate::Config::section) and get a
//! value that is already safe to build a client from.

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A configuration sub-tree living at a fixed dotted path.
pub trait Section: serde::de::DeserializeOwned {
    /// Dotted path of the section, e.g. `"storage.s3"`.
    const PATH: &'static str;

    /// Reject values that deserialize fine but can't possibly work.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn require(value: &str, path: &str) -> Result<()> {
    if value.trim().is_empty() {
        exn::bail!(ErrorKind::Invalid(path.to_string()));
    }
    Ok(())
}

/// `storage`: which backend the command-line uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Backend name: `s3`, `dropbox` or `local`.
    #[serde(default = "StorageSettings::default_backend")]
    pub backend: String,
}
impl StorageSettings {
    fn default_backend() -> String {
        "local".to_string()
    }
}
impl Default for StorageSettings {
    fn default() -> Self {
        Self { backend: Self::default_backend() }
    }
}
impl Section for StorageSettings {
    const PATH: &'static str = "storage";

    fn validate(&self) -> Result<()> {
        require(&self.backend, "storage.backend")
    }
}

/// `storage.s3`: any S3-compatible object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    pub bucket: String,
    /// Optional key prefix acting as a virtual directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub region: String,
    /// Custom endpoint for non-AWS services (Backblaze, MinIO, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
}
impl Section for S3Settings {
    const PATH: &'static str = "storage.s3";

    fn validate(&self) -> Result<()> {
        require(&self.bucket, "storage.s3.bucket")?;
        require(&self.region, "storage.s3.region")?;
        require(&self.key_id, "storage.s3.key_id")?;
        require(&self.key_secret, "storage.s3.key_secret")
    }
}

/// `storage.dropbox`: Dropbox API v2 with a long-lived access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropboxSettings {
    pub access_token: String,
    #[serde(default = "DropboxSettings::default_api_url")]
    pub api_url: String,
    #[serde(default = "DropboxSettings::default_content_url")]
    pub content_url: String,
}
impl DropboxSettings {
    fn default_api_url() -> String {
        "https://api.dropboxapi.com/2".to_string()
    }

    fn default_content_url() -> String {
        "https://content.dropboxapi.com/2".to_string()
    }
}
impl Section for DropboxSettings {
    const PATH: &'static str = "storage.dropbox";

    fn validate(&self) -> Result<()> {
        require(&self.access_token, "storage.dropbox.access_token")
    }
}

/// `storage.local`: a directory on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Absolute path of the archive root.
    pub directory: PathBuf,
}
impl Section for LocalSettings {
    const PATH: &'static str = "storage.local";

    fn validate(&self) -> Result<()> {
        if !self.directory.is_absolute() {
            exn::bail!(ErrorKind::Invalid("storage.local.directory".to_string()));
        }
        Ok(())
    }
}

/// `youtube`: YouTube Data API v3 credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeSettings {
    pub api_key: String,
    #[serde(default = "YoutubeSettings::default_api_url")]
    pub api_url: String,
}
impl YoutubeSettings {
    fn default_api_url() -> String {
        "https://www.googleapis.com/youtube/v3".to_string()
    }
}
impl Section for YoutubeSettings {
    const PATH: &'static str = "youtube";

    fn validate(&self) -> Result<()> {
        require(&self.api_key, "youtube.api_key")
    }
}

/// `download`: the external program that turns a watch URL into bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSettings {
    pub program: PathBuf,
    /// Format selector passed to the program.
    pub format: String,
}
impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            format: "best[ext=mp4]/best".to_string(),
        }
    }
}
impl Section for DownloadSettings {
    const PATH: &'static str = "download";

    fn validate(&self) -> Result<()> {
        require(&self.format, "download.format")
    }
}

/// `queue`: the durable job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// SQLite database file.
    pub database: PathBuf,
    /// Queue name; several queues can share one database.
    pub name: String,
    /// How many times a job is attempted before it is marked as failed.
    pub max_attempts: u32,
    /// Fallback polling interval when no in-process notification arrives.
    pub poll_interval_ms: u64,
}
impl Default for QueueSettings {
    fn default() -> Self {
        let database = ProjectDirs::from("", "", "tubevault")
            .map(|dirs| dirs.data_dir().join("queue.sqlite"))
            .unwrap_or_else(|| PathBuf::from("tubevault-queue.sqlite"));
        Self {
            database,
            name: "backup".to_string(),
            max_attempts: 3,
            poll_interval_ms: 1000,
        }
    }
}
impl Section for QueueSettings {
    const PATH: &'static str = "queue";

    fn validate(&self) -> Result<()> {
        require(&self.name, "queue.name")?;
        if self.max_attempts == 0 {
            exn::bail!(ErrorKind::Invalid("queue.max_attempts".to_string()));
        }
        Ok(())
    }
}

/// `worker`: job processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Number of jobs processed simultaneously.
    pub concurrency: usize,
}
impl Default for WorkerSettings {
    fn default() -> Self {
        Self { concurrency: 2 }
    }
}
impl Section for WorkerSettings {
    const PATH: &'static str = "worker";

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("worker.concurrency".to_string()));
        }
        Ok(())
    }
}
