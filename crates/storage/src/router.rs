//! Backend selection by name.
//!
//! The router hands out one shared instance per backend kind, built lazily
//! from configuration the first time it is asked for.

use crate::backend::LocalBackend;
#[cfg(feature = "dropbox")]
use crate::backend::DropboxBackend;
#[cfg(feature = "s3")]
use crate::backend::S3Backend;
use crate::error::{ErrorKind, Result};
use crate::BackendHandle;
use derive_more::Display;
use exn::ResultExt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tubevault_config::{Config, LocalSettings};
#[cfg(feature = "dropbox")]
use tubevault_config::DropboxSettings;
#[cfg(feature = "s3")]
use tubevault_config::S3Settings;

/// The closed set of storage backends.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    #[display("s3")]
    S3,
    #[display("dropbox")]
    Dropbox,
    #[display("local")]
    Local,
}

impl FromStr for BackendKind {
    type Err = ErrorKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "dropbox" => Ok(Self::Dropbox),
            "local" | "filesystem" => Ok(Self::Local),
            _ => Err(ErrorKind::InvalidStorageName(s.to_string())),
        }
    }
}

/// Resolves storage names to process-wide backend instances.
///
/// Each backend is constructed at most once; concurrent first requests for
/// the same backend wait on a single initialization.
///
/// # Examples
///
/// ```
/// use tubevault_config::Config;
/// use tubevault_storage::StorageRouter;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let router = StorageRouter::new(Config::from_toml_str(""));
/// assert!(router.get("carrier-pigeon").await.is_err());
/// # }
/// ```
pub struct StorageRouter {
    config: Config,
    s3: OnceCell<BackendHandle>,
    dropbox: OnceCell<BackendHandle>,
    local: OnceCell<BackendHandle>,
}

impl StorageRouter {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            s3: OnceCell::new(),
            dropbox: OnceCell::new(),
            local: OnceCell::new(),
        }
    }

    /// Backend for a storage name (`s3`, `dropbox`, `local`).
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InvalidStorageName`] for an unknown name,
    /// [`ErrorKind::Disabled`] for a backend not compiled into this build, and
    /// [`ErrorKind::Config`] if the backend's configuration is missing or
    /// invalid.
    pub async fn get(&self, name: &str) -> Result<BackendHandle> {
        let kind: BackendKind = name.parse()?;
        self.get_kind(kind).await
    }

    /// The backend named by `storage.backend`.
    pub async fn default_backend(&self) -> Result<BackendHandle> {
        let settings: tubevault_config::StorageSettings =
            self.config.section().or_raise(|| ErrorKind::Config("storage".to_string()))?;
        self.get(&settings.backend).await
    }

    pub async fn get_kind(&self, kind: BackendKind) -> Result<BackendHandle> {
        let cell = match kind {
            BackendKind::S3 => &self.s3,
            BackendKind::Dropbox => &self.dropbox,
            BackendKind::Local => &self.local,
        };
        let handle = cell
            .get_or_try_init(|| async {
                tracing::debug!(backend = %kind, "Initializing storage backend");
                self.build(kind).await
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    async fn build(&self, kind: BackendKind) -> Result<BackendHandle> {
        let config_error = || ErrorKind::Config(kind.to_string());
        match kind {
            #[cfg(feature = "s3")]
            BackendKind::S3 => {
                let s3: S3Settings = self.config.section().or_raise(config_error)?;
                let backend = S3Backend::new(
                    kind.to_string(),
                    s3.bucket,
                    s3.prefix,
                    s3.region,
                    s3.endpoint,
                    s3.key_id,
                    s3.key_secret,
                )
                .await
                .or_raise(config_error)?;
                Ok(Arc::new(backend))
            },
            #[cfg(feature = "dropbox")]
            BackendKind::Dropbox => {
                let dropbox: DropboxSettings = self.config.section().or_raise(config_error)?;
                Ok(Arc::new(DropboxBackend::new(
                    kind.to_string(),
                    dropbox.access_token,
                    dropbox.api_url,
                    dropbox.content_url,
                )))
            },
            BackendKind::Local => {
                let local: LocalSettings = self.config.section().or_raise(config_error)?;
                let backend = LocalBackend::new(kind.to_string(), &local.directory).or_raise(config_error)?;
                Ok(Arc::new(backend))
            },
            #[allow(unreachable_patterns)]
            disabled => exn::bail!(ErrorKind::Disabled(disabled.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("s3", BackendKind::S3)]
    #[case("dropbox", BackendKind::Dropbox)]
    #[case("local", BackendKind::Local)]
    #[case("filesystem", BackendKind::Local)]
    #[case(" Local ", BackendKind::Local)]
    fn test_parse_kind(#[case] name: &str, #[case] expected: BackendKind) {
        assert_eq!(name.parse::<BackendKind>().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_unknown_name() {
        let router = StorageRouter::new(Config::from_toml_str(""));
        let err = router.get("ftp").await.err().unwrap();
        assert_eq!((*err).to_string(), "invalid storage name: ftp");
    }

    #[tokio::test]
    async fn test_local_backend_is_shared() {
        let temp_dir = tempfile::tempdir().unwrap();
        let toml = format!("[storage.local]\ndirectory = {:?}\n", temp_dir.path().display().to_string());
        let router = StorageRouter::new(Config::from_toml_str(&toml));
        let first = router.get("local").await.unwrap();
        let second = router.get("filesystem").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "local");
        let default = router.default_backend().await.unwrap();
        assert!(Arc::ptr_eq(&first, &default));
    }

    #[tokio::test]
    async fn test_missing_configuration() {
        let router = StorageRouter::new(Config::from_toml_str(""));
        let err = router.get("local").await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Config(name) if name == "local"));
    }

    #[tokio::test]
    async fn test_relative_directory_is_rejected() {
        let router = StorageRouter::new(Config::from_toml_str("[storage.local]\ndirectory = \"relative\"\n"));
        let err = router.get("local").await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Config(_)));
    }

    #[cfg(feature = "dropbox")]
    #[tokio::test]
    async fn test_dropbox_requires_token() {
        let router = StorageRouter::new(Config::from_toml_str("[storage.dropbox]\naccess_token = \"\"\n"));
        assert!(router.get("dropbox").await.is_err());
        let router = StorageRouter::new(Config::from_toml_str("[storage.dropbox]\naccess_token = \"t\"\n"));
        assert_eq!(router.get("dropbox").await.unwrap().name(), "dropbox");
    }
}
