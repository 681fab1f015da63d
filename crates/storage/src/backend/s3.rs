//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Backblaze B2, MinIO, and others.
//!
//! Objects are keyed `{prefix}/{playlistName}/{videoName} ({videoId}).mp4`.
//! Uploads are streamed: a body that fits in a single chunk goes up with one
//! `PutObject`, anything larger as a multipart upload.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file
//! (`storage.s3.key_id` and `storage.s3.key_secret`).

use crate::{
    StorageBackend, StoredEntry, VideoItem,
    backend::{BoxAsyncRead, CHUNK_SIZE, StoredEntryStream, VIDEO_EXTENSION, read_chunk},
    error::{ErrorKind, Result},
    validate_segment,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use exn::{OptionExt, ResultExt};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

const CONTENT_TYPE: &str = "video/mp4";

/// `{playlistName}/{videoName} ({videoId}).mp4`, relative to the prefix.
static OBJECT_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<playlist>[^/]+)/(?<name>[^/]+) \((?<id>[^()/]+)\)\.mp4$").unwrap()
});

/// S3-compatible storage backend.
///
/// # Examples
///
/// ```no_run
/// use tubevault_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "s3",
///     "my-bucket",
///     Some("youtube".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in display/logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "tubevault-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::from_client(name, Client::from_conf(config_builder.build()), bucket, prefix)
    }

    /// Wrap an already configured client.
    pub fn from_client(
        name: impl Into<String>,
        client: Client,
        bucket: impl Into<String>,
        prefix: Option<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(|p| p.trim_matches('/').to_string()).filter(|p| !p.is_empty());
        if let Some(prefix) = &prefix {
            for segment in prefix.split('/') {
                validate_segment(segment)?;
            }
        }
        Ok(Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key for a video.
    fn full_key(&self, item: &VideoItem) -> Result<String> {
        let playlist = validate_segment(item.playlist_name())?;
        let file_name = format!("{}.{VIDEO_EXTENSION}", item.titled_stem());
        let relative = format!("{playlist}/{}", validate_segment(&file_name)?);
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{relative}"),
            None => relative,
        })
    }

    /// Strip the configured prefix and parse what's left back into an entry.
    fn parse_key(&self, key: &str) -> Result<StoredEntry> {
        let relative = match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str()).and_then(|s| s.strip_prefix('/')),
            None => Some(key),
        };
        relative
            .and_then(parse_relative_key)
            .ok_or_raise(|| ErrorKind::MalformedEntry(key.to_string()))
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    async fn put_single(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(ByteStream::from(body))
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("PutObject {key}")))?;
        Ok(())
    }

    /// Upload `first` followed by the rest of `reader` as a multipart upload,
    /// aborting the upload if any part fails.
    async fn put_multipart(&self, key: &str, first: Vec<u8>, reader: &mut BoxAsyncRead) -> Result<()> {
        let created = {
            let _permit = self.acquire_permit().await?;
            self.client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .content_type(CONTENT_TYPE)
                .send()
                .await
                .or_raise(|| ErrorKind::Network(format!("CreateMultipartUpload {key}")))?
        };
        let upload_id = created
            .upload_id()
            .map(str::to_string)
            .ok_or_raise(|| ErrorKind::BackendError(format!("no upload id returned for {key}")))?;

        let result = self.upload_parts(key, &upload_id, first, reader).await;
        if result.is_err() {
            let _permit = self.acquire_permit().await?;
            let aborted =
                self.client.abort_multipart_upload().bucket(&self.bucket).key(key).upload_id(&upload_id).send().await;
            if let Err(e) = aborted {
                tracing::warn!(key, upload_id, error = %e, "Failed to abort multipart upload");
            }
        }
        result
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        reader: &mut BoxAsyncRead,
    ) -> Result<()> {
        let mut parts = Vec::new();
        let mut chunk = first;
        let mut part_number = 1;
        while !chunk.is_empty() {
            let last = chunk.len() < CHUNK_SIZE;
            let uploaded = {
                let _permit = self.acquire_permit().await?;
                self.client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(chunk))
                    .send()
                    .await
                    .or_raise(|| ErrorKind::Network(format!("UploadPart {part_number} of {key}")))?
            };
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            tracing::trace!(key, part_number, "Uploaded part");
            if last {
                break;
            }
            part_number += 1;
            chunk = read_chunk(reader, CHUNK_SIZE).await?;
        }
        let _permit = self.acquire_permit().await?;
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("CompleteMultipartUpload {key}")))?;
        Ok(())
    }
}

/// Parse `{playlistName}/{videoName} ({videoId}).mp4`.
fn parse_relative_key(relative: &str) -> Option<StoredEntry> {
    let captures = OBJECT_KEY.captures(relative)?;
    Some(StoredEntry::new(Some(captures["id"].to_string()), &captures["name"], &captures["playlist"]))
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> StoredEntryStream<'_> {
        Box::pin(stream! {
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(self.prefix.as_ref().map(|p| format!("{p}/")))
                .into_paginator()
                .send();
            'pages: while let Some(page) = pages.next().await {
                let page = match page.or_raise(|| ErrorKind::Network(format!("ListObjectsV2 {}", self.bucket))) {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break 'pages;
                    },
                };
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    match self.parse_key(key) {
                        Ok(entry) => yield Ok(entry),
                        Err(e) => {
                            yield Err(e);
                            break 'pages;
                        },
                    }
                }
            }
        })
    }

    async fn store(&self, mut reader: BoxAsyncRead, item: &VideoItem) -> Result<()> {
        let key = self.full_key(item)?;
        let first = read_chunk(&mut reader, CHUNK_SIZE).await?;
        if first.len() < CHUNK_SIZE {
            tracing::debug!(key, bytes = first.len(), "Uploading in a single request");
            self.put_single(&key, first).await
        } else {
            tracing::debug!(key, "Uploading in parts");
            self.put_multipart(&key, first, &mut reader).await
        }
    }
}
