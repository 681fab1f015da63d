//! Turning a watch URL into a byte stream.
//!
//! The default implementation runs `yt-dlp` with the media written to stdout
//! and hands that pipe out as the stream, so nothing touches the local disk.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use reqwest::Url;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{ChildStdout, Command};
use tokio::sync::oneshot;
use tubevault_config::DownloadSettings;
use tubevault_storage::BoxAsyncRead;

/// Capability to fetch the media behind a watch URL.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Start downloading; the returned reader yields the media bytes and
    /// fails with an I/O error if the download breaks off.
    async fn download(&self, url: &Url) -> Result<BoxAsyncRead>;
}

/// Downloads through an external `yt-dlp` (or compatible) program.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: PathBuf,
    format: String,
}

impl YtDlpDownloader {
    pub fn new(program: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
        }
    }

    pub fn from_settings(settings: &DownloadSettings) -> Self {
        Self::new(&settings.program, &settings.format)
    }

    fn command(&self, url: &Url) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["--format", self.format.as_str()])
            .args(["--output", "-"])
            .args(["--quiet", "--no-progress", "--no-playlist", "--no-part"])
            .arg(url.as_str());
        command
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, url: &Url) -> Result<BoxAsyncRead> {
        tracing::debug!(program = %self.program.display(), %url, "Starting download");
        let reader = ProcessReader::spawn(self.command(url))?;
        Ok(Box::new(reader))
    }
}

/// Stdout of a child process as an [`AsyncRead`].
///
/// End-of-stream is only reported once the process has exited successfully;
/// a non-zero exit turns into an I/O error instead. Dropping the reader
/// kills the process.
pub struct ProcessReader {
    stdout: ChildStdout,
    status: oneshot::Receiver<io::Result<ExitStatus>>,
    /// Dropping this tells the supervising task to kill the process.
    _kill: oneshot::Sender<()>,
    program: String,
    finished: bool,
}

impl ProcessReader {
    /// Spawn `command` with stdout piped; stderr is forwarded to the log.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(mut command: Command) -> Result<Self> {
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .or_raise(|| ErrorKind::Spawn(program.clone()))?;
        let stdout = child.stdout.take().ok_or_raise(|| ErrorKind::Spawn(program.clone()))?;
        if let Some(stderr) = child.stderr.take() {
            let program = program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(program = %program, "{line}");
                }
            });
        }
        let (status_tx, status_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let _ = status_tx.send(status);
                },
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill download process");
                    }
                },
            }
        });
        Ok(Self {
            stdout,
            status: status_rx,
            _kill: kill_tx,
            program,
            finished: false,
        })
    }
}

impl AsyncRead for ProcessReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Ok(()));
        }
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.stdout).poll_read(cx, buf))?;
        if buf.filled().len() > before {
            return Poll::Ready(Ok(()));
        }
        // Stdout is closed; the stream is only complete if the process agrees.
        let status = ready!(Pin::new(&mut this.status).poll(cx));
        this.finished = true;
        Poll::Ready(match status {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(io::Error::other(format!("{} exited with {status}", this.program))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::other(format!("lost track of {}", this.program))),
        })
    }
}
