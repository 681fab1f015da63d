//! Dropbox storage backend.
//!
//! Talks to the Dropbox HTTP API v2 directly. Videos live one folder per
//! playlist: `/{playlistName}/{videoName} ({videoId}).mp4`. Dropbox folds the
//! case of paths itself, so listing matches files to their folders
//! case-insensitively.

use crate::{
    StorageBackend, StoredEntry, VideoItem,
    backend::{BoxAsyncRead, CHUNK_SIZE, StoredEntryStream, VIDEO_EXTENSION, read_chunk},
    error::{ErrorKind, Result},
    validate_segment,
};
use async_stream::stream;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::LazyLock;

/// `{videoName} ({videoId})`
static TITLED_STEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?<name>.+) \((?<id>[^()]+)\)$").unwrap());

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Dropbox storage backend.
///
/// # Examples
///
/// ```no_run
/// use tubevault_storage::backend::DropboxBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = DropboxBackend::new(
///     "dropbox",
///     "sl.access-token",
///     "https://api.dropboxapi.com/2",
///     "https://content.dropboxapi.com/2",
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DropboxBackend {
    name: String,
    client: Client,
    access_token: String,
    api_url: String,
    content_url: String,
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<Metadata>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
enum Metadata {
    Folder {
        name: String,
        path_lower: Option<String>,
    },
    File {
        name: String,
        path_lower: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct UploadSessionStart {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct CommitInfo<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
    mute: bool,
}
impl<'a> CommitInfo<'a> {
    fn overwrite(path: &'a str) -> Self {
        Self {
            path,
            mode: "overwrite",
            autorename: false,
            mute: true,
        }
    }
}

impl DropboxBackend {
    pub fn new(
        name: impl Into<String>,
        access_token: impl Into<String>,
        api_url: impl Into<String>,
        content_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            access_token: access_token.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            content_url: content_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Call an RPC endpoint (JSON in, JSON out).
    async fn rpc<T: DeserializeOwned>(&self, endpoint: &str, body: &serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.api_url))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(endpoint.to_string()))?;
        let response = Self::check_status(endpoint, response).await?;
        response.json().await.or_raise(|| ErrorKind::BackendError(format!("unexpected response from {endpoint}")))
    }

    /// Call a content-upload endpoint: arguments in a header, bytes in the body.
    async fn upload<T: DeserializeOwned>(&self, endpoint: &str, arg: &serde_json::Value, data: Vec<u8>) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.content_url))
            .bearer_auth(&self.access_token)
            .header(API_ARG_HEADER, api_arg(arg))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(endpoint.to_string()))?;
        let response = Self::check_status(endpoint, response).await?;
        response.json().await.or_raise(|| ErrorKind::BackendError(format!("unexpected response from {endpoint}")))
    }

    async fn check_status(endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let kind = if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            ErrorKind::Network(format!("{endpoint} returned {status}: {body}"))
        } else {
            ErrorKind::BackendError(format!("{endpoint} returned {status}: {body}"))
        };
        Err(exn::Exn::from(kind))
    }

    /// Create the playlist folder; an existing folder is fine.
    async fn ensure_folder(&self, path: &str) -> Result<()> {
        let endpoint = "files/create_folder_v2";
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.api_url))
            .bearer_auth(&self.access_token)
            .json(&json!({ "path": path, "autorename": false }))
            .send()
            .await
            .or_raise(|| ErrorKind::Network(endpoint.to_string()))?;
        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            if is_folder_conflict(&body) {
                tracing::trace!(path, "Folder already exists");
                return Ok(());
            }
            exn::bail!(ErrorKind::BackendError(format!("{endpoint} returned 409: {body}")));
        }
        Self::check_status(endpoint, response).await?;
        tracing::debug!(path, "Created folder");
        Ok(())
    }

    async fn list_entries(&self) -> Result<Vec<Metadata>> {
        let mut page: ListFolderResult =
            self.rpc("files/list_folder", &json!({ "path": "", "recursive": true })).await?;
        let mut entries = std::mem::take(&mut page.entries);
        while page.has_more {
            page = self.rpc("files/list_folder/continue", &json!({ "cursor": page.cursor })).await?;
            entries.append(&mut page.entries);
        }
        Ok(entries)
    }

    async fn upload_session(&self, path: &str, first: Vec<u8>, reader: &mut BoxAsyncRead) -> Result<()> {
        let mut offset = first.len() as u64;
        let started: UploadSessionStart =
            self.upload("files/upload_session/start", &json!({ "close": false }), first).await?;
        loop {
            let chunk = read_chunk(reader, CHUNK_SIZE).await?;
            let cursor = json!({ "session_id": started.session_id, "offset": offset });
            if chunk.len() < CHUNK_SIZE {
                let arg = json!({ "cursor": cursor, "commit": CommitInfo::overwrite(path) });
                let _: serde_json::Value = self.upload("files/upload_session/finish", &arg, chunk).await?;
                return Ok(());
            }
            offset += chunk.len() as u64;
            // append_v2 answers with a literal `null`.
            let arg = json!({ "cursor": cursor, "close": false });
            let _: serde_json::Value = self.upload("files/upload_session/append_v2", &arg, chunk).await?;
            tracing::trace!(path, offset, "Appended to upload session");
        }
    }
}

fn is_folder_conflict(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error_summary").and_then(|s| s.as_str()).map(|s| s.starts_with("path/conflict")))
        .unwrap_or(false)
}

/// JSON for the `Dropbox-API-Arg` header, with everything outside ASCII
/// escaped (HTTP header values must be ASCII).
fn api_arg(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(escaped, "\\u{unit:04x}");
            }
        }
    }
    escaped
}

/// Turn a recursive listing into archive entries.
///
/// Every file must sit directly inside a listed folder and have an
/// extension; anything else fails the whole inventory.
fn inventory(entries: Vec<Metadata>) -> Result<Vec<StoredEntry>> {
    let folders: HashMap<String, String> = entries
        .iter()
        .filter_map(|entry| match entry {
            Metadata::Folder { name, path_lower } => {
                let path = path_lower.clone().unwrap_or_else(|| format!("/{name}"));
                Some((path.to_lowercase(), name.clone()))
            },
            _ => None,
        })
        .collect();

    let mut stored = Vec::new();
    for entry in entries {
        let Metadata::File { name, path_lower } = entry else { continue };
        let path = path_lower.unwrap_or_else(|| name.to_lowercase());
        let playlist = path
            .rsplit_once('/')
            .and_then(|(parent, _)| folders.get(&parent.to_lowercase()))
            .ok_or_raise(|| ErrorKind::MalformedEntry(path.clone()))?;
        let stem = name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|stem| !stem.is_empty())
            .ok_or_raise(|| ErrorKind::MalformedEntry(path.clone()))?;
        let entry = match TITLED_STEM.captures(stem) {
            Some(captures) => StoredEntry::new(Some(captures["id"].to_string()), &captures["name"], playlist),
            None => StoredEntry::new(None, stem, playlist),
        };
        stored.push(entry);
    }
    Ok(stored)
}

#[async_trait]
impl StorageBackend for DropboxBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> StoredEntryStream<'_> {
        Box::pin(stream! {
            // Folders and their files may arrive on different pages, so the
            // listing has to be complete before anything can be classified.
            match self.list_entries().await.and_then(inventory) {
                Ok(entries) => {
                    for entry in entries {
                        yield Ok(entry);
                    }
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn store(&self, mut reader: BoxAsyncRead, item: &VideoItem) -> Result<()> {
        let folder = format!("/{}", validate_segment(item.playlist_name())?);
        let file_name = format!("{}.{VIDEO_EXTENSION}", item.titled_stem());
        let path = format!("{folder}/{}", validate_segment(&file_name)?);
        self.ensure_folder(&folder).await?;

        let first = read_chunk(&mut reader, CHUNK_SIZE).await?;
        if first.len() < CHUNK_SIZE {
            let arg = serde_json::to_value(CommitInfo::overwrite(&path))
                .or_raise(|| ErrorKind::BackendError(path.clone()))?;
            let _: serde_json::Value = self.upload("files/upload", &arg, first).await?;
        } else {
            self.upload_session(&path, first, &mut reader).await?;
        }
        tracing::debug!(path, "Uploaded to Dropbox");
        Ok(())
    }
}
