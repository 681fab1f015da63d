//! Local filesystem storage backend.
//!
//! Videos are stored one directory per playlist under a configured root:
//! `{root}/{playlistName}/{videoName}_{videoId}.{ext}`. Files are written via
//! `tokio::fs` for async I/O.

use crate::backend::{BoxAsyncRead, StoredEntryStream, VIDEO_EXTENSION};
use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, StoredEntry, VideoItem, validate_segment};
use async_stream::stream;
use async_trait::async_trait;
use exn::OptionExt;
use regex::Regex;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncWriteExt;

/// `{videoName}_{videoId}.{ext}`
///
/// The id is matched as a YouTube id (11 characters of `[A-Za-z0-9_-]`) when
/// possible so that ids containing underscores survive; any other id must be
/// free of underscores and dots.
static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<name>.+?)_(?<id>[A-Za-z0-9_-]{11}|[^_.]+)\.(?<ext>[A-Za-z0-9]+)$").unwrap()
});

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use tubevault_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/srv/videos")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the archive
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but isn't a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root.display().to_string()));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root.display().to_string()));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path a video item is written to.
    fn item_path(&self, item: &VideoItem) -> Result<PathBuf> {
        let playlist = validate_segment(item.playlist_name())?;
        let file_name = format!("{}_{}.{VIDEO_EXTENSION}", item.video_name(), item.video_id());
        Ok(self.root.join(playlist).join(validate_segment(&file_name)?))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn utf8_name(entry: &DirEntry) -> Result<String> {
        let path = entry.path();
        entry.file_name().into_string().ok().ok_or_raise(|| ErrorKind::MalformedEntry(path.display().to_string()))
    }

    /// Top-level entries: directories are playlists, everything else is ignored.
    async fn playlist_dir(&self, entry: &DirEntry) -> Result<Option<String>> {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &path))?;
        if !file_type.is_dir() {
            return Ok(None);
        }
        Ok(Some(Self::utf8_name(entry)?))
    }

    /// Entries inside a playlist directory: every regular file must follow
    /// the naming convention, anything else is ignored.
    async fn video_file(&self, playlist: &str, entry: &DirEntry) -> Result<Option<StoredEntry>> {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &path))?;
        if !file_type.is_file() {
            return Ok(None);
        }
        let file_name = Self::utf8_name(entry)?;
        let captures = FILE_NAME
            .captures(&file_name)
            .ok_or_raise(|| ErrorKind::MalformedEntry(path.display().to_string()))?;
        Ok(Some(StoredEntry::new(Some(captures["id"].to_string()), &captures["name"], playlist)))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> StoredEntryStream<'_> {
        Box::pin(stream! {
            'walk: {
                let mut playlists = match fs::read_dir(&self.root).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        yield Err(exn::Exn::from(Self::map_io_error(e, &self.root)));
                        break 'walk;
                    },
                };
                loop {
                    let dir = match playlists.next_entry().await {
                        Ok(Some(dir)) => dir,
                        Ok(None) => break 'walk,
                        Err(e) => {
                            yield Err(exn::Exn::from(Self::map_io_error(e, &self.root)));
                            break 'walk;
                        },
                    };
                    let playlist = match self.playlist_dir(&dir).await {
                        Ok(Some(playlist)) => playlist,
                        Ok(None) => continue,
                        Err(e) => {
                            yield Err(e);
                            break 'walk;
                        },
                    };
                    let dir_path = dir.path();
                    let mut files = match fs::read_dir(&dir_path).await {
                        Ok(entries) => entries,
                        Err(e) => {
                            yield Err(exn::Exn::from(Self::map_io_error(e, &dir_path)));
                            break 'walk;
                        },
                    };
                    loop {
                        let file = match files.next_entry().await {
                            Ok(Some(file)) => file,
                            Ok(None) => break,
                            Err(e) => {
                                yield Err(exn::Exn::from(Self::map_io_error(e, &dir_path)));
                                break 'walk;
                            },
                        };
                        match self.video_file(&playlist, &file).await {
                            Ok(Some(entry)) => yield Ok(entry),
                            Ok(None) => {},
                            Err(e) => {
                                yield Err(e);
                                break 'walk;
                            },
                        }
                    }
                }
            }
        })
    }

    async fn store(&self, mut reader: BoxAsyncRead, item: &VideoItem) -> Result<()> {
        let path = self.item_path(item)?;
        if let Some(parent) = path.parent() {
            // Idempotent; the playlist directory usually exists already.
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, parent))?;
        }
        let mut file = fs::File::create(&path).await.map_err(|e| Self::map_io_error(e, &path))?;
        let written = async {
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;
        match written {
            Ok(bytes) => {
                tracing::debug!(path = %path.display(), bytes, "Wrote video file");
                Ok(())
            },
            Err(e) => {
                drop(file);
                // Don't leave a truncated video behind; it would look archived.
                if let Err(cleanup) = fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial file");
                }
                Err(exn::Exn::from(Self::map_io_error(e, &path)))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// Yields some bytes, then fails.
    struct BrokenReader {
        sent: bool,
    }
    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::other("connection reset")));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    fn reader(data: &[u8]) -> BoxAsyncRead {
        Box::new(Cursor::new(data.to_vec()))
    }

    fn item(id: &str, name: &str, playlist: &str) -> VideoItem {
        VideoItem::new(id, name, "PL1", playlist).unwrap()
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("local", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("local", "relative/path").is_err());
        assert!(LocalBackend::new("local", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("a/b");
        LocalBackend::new("local", &root).unwrap();
        assert!(root.is_dir());
    }

    #[rstest]
    #[case("Song_dQw4w9WgXcQ.mp4", Some(("Song", "dQw4w9WgXcQ")))]
    #[case("My_Song_Title_a-b_c1d2e3f.webm", Some(("My_Song_Title", "a-b_c1d2e3f")))]
    #[case("Clip_abc.mkv", Some(("Clip", "abc")))]
    #[case("dQw4w9WgXcQ.mp4", None)]
    #[case("no-id-here.mp4", None)]
    #[case("Song_dQw4w9WgXcQ", None)]
    #[case("Song_dQw4w9WgXcQ.mp4.part", None)]
    fn test_file_name_pattern(#[case] file_name: &str, #[case] expected: Option<(&str, &str)>) {
        let captures = FILE_NAME.captures(file_name);
        let parsed = captures.as_ref().map(|c| (c.name("name").unwrap().as_str(), c.name("id").unwrap().as_str()));
        assert_eq!(parsed, expected);
    }

    #[tokio::test]
    async fn test_save_and_list_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        let video = item("dQw4w9WgXcQ", "Never Gonna Give You Up", "Eighties");
        backend.save(reader(b"video bytes"), &video).await.unwrap();

        let path = temp_dir.path().join("Eighties/Never Gonna Give You Up_dQw4w9WgXcQ.mp4");
        assert_eq!(std::fs::read(&path).unwrap(), b"video bytes");

        let listed = backend.list_all().await.unwrap();
        assert_eq!(listed, vec![StoredEntry::from(&video)]);
    }

    #[tokio::test]
    async fn test_round_trip_with_underscores_and_escapes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        let video = item("x_Y-z0123AB", "snake_case \\u00e9pisode", "My_List");
        backend.save(reader(b"data"), &video).await.unwrap();
        let listed = backend.list_all().await.unwrap();
        assert_eq!(listed, vec![StoredEntry::from(&video)]);
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        assert!(backend.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ignores_top_level_files_and_nested_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        std::fs::write(temp_dir.path().join("README.txt"), b"not a playlist").unwrap();
        std::fs::create_dir_all(temp_dir.path().join("Playlist/nested")).unwrap();
        std::fs::write(temp_dir.path().join("Playlist/Video_abc.mp4"), b"data").unwrap();
        let listed = backend.list_all().await.unwrap();
        assert_eq!(listed, vec![StoredEntry::new(Some("abc".to_string()), "Video", "Playlist")]);
    }

    #[tokio::test]
    async fn test_list_fails_on_malformed_file_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("Playlist")).unwrap();
        std::fs::write(temp_dir.path().join("Playlist/Good_abc.mp4"), b"data").unwrap();
        std::fs::write(temp_dir.path().join("Playlist/notes.txt"), b"oops").unwrap();
        let err = backend.list_all().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::List(name) if name == "local"));
    }

    #[tokio::test]
    async fn test_save_rejects_path_traversal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path().join("root")).unwrap();
        let video = item("abc", "escape", "..");
        let err = backend.save(reader(b"data"), &video).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Save(json) if json.contains(r#""playlistName":"..""#)));
        assert!(!temp_dir.path().join("escape_abc.mp4").exists());
    }

    #[tokio::test]
    async fn test_failed_save_removes_partial_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        let video = item("abc", "Broken", "Playlist");
        let err = backend.save(Box::new(BrokenReader { sent: false }), &video).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Save(_)));
        assert!(!temp_dir.path().join("Playlist/Broken_abc.mp4").exists());
        assert!(backend.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        let video = item("abc", "Video", "Playlist");
        backend.save(reader(b"first"), &video).await.unwrap();
        backend.save(reader(b"second"), &video).await.unwrap();
        assert_eq!(std::fs::read(temp_dir.path().join("Playlist/Video_abc.mp4")).unwrap(), b"second");
        assert_eq!(backend.list_all().await.unwrap().len(), 1);
    }
}
