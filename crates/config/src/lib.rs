//! Layered configuration for tubevault.
//!
//! Configuration is read once at startup from (in increasing priority):
//! built-in defaults, a configuration file (TOML, YAML or JSON, detected by
//! extension) and `TUBEVAULT_`-prefixed environment variables where `__`
//! separates nesting levels (`TUBEVAULT_STORAGE__BACKEND=s3`).
//!
//! Everything downstream only relies on the lookup contract: give a dotted
//! path, get a typed value back, or an error naming the path.
//!
//! ```
//! use tubevault_config::{Config, QueueSettings};
//!
//! let config = Config::from_toml_str(r#"
//!     [queue]
//!     name = "nightly"
//! "#);
//! let queue: QueueSettings = config.get("queue").unwrap();
//! assert_eq!(queue.name, "nightly");
//! assert_eq!(queue.max_attempts, 3);
//! ```

pub mod error;
mod settings;

pub use crate::settings::{
    DownloadSettings, DropboxSettings, LocalSettings, QueueSettings, S3Settings, Section, StorageSettings,
    WorkerSettings, YoutubeSettings,
};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::value::Value;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "TUBEVAULT_";
const ENV_SEPARATOR: &str = "__";

/// Read-only configuration tree.
///
/// Cheap to clone; hand a copy to whatever needs to pull its own section.
#[derive(Debug, Clone)]
pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// When `path` is `None`, the default location
    /// (see [`default_path()`](Self::default_path)) is used if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Self::defaults();
        let path = path.map(Path::to_path_buf).or_else(|| Self::default_path().filter(|p| p.exists()));
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => figment.merge(Toml::file_exact(&path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&path)),
                Some("json") => figment.merge(Json::file_exact(&path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path)),
            };
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR));
        let config = Self { figment };
        // Surface syntax errors in the file now rather than on first lookup.
        config.figment.extract::<Value>().or_raise(|| ErrorKind::Invalid(String::new()))?;
        Ok(config)
    }

    /// Build a configuration from built-in defaults and an inline TOML
    /// document, ignoring files and the environment (useful for tests).
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Self::defaults().merge(Toml::string(toml)) }
    }

    /// Wrap an already-assembled [`Figment`].
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Default configuration file location, e.g. `~/.config/tubevault/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tubevault").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn defaults() -> Figment {
        Figment::new()
            .merge(Serialized::default("storage", StorageSettings::default()))
            .merge(Serialized::default("download", DownloadSettings::default()))
            .merge(Serialized::default("queue", QueueSettings::default()))
            .merge(Serialized::default("worker", WorkerSettings::default()))
    }

    /// Extract the value at a dotted path (`"storage.s3"`).
    ///
    /// An empty path extracts the entire tree. Fails with
    /// [`Missing`](ErrorKind::Missing) if nothing is configured at `path`,
    /// or [`Invalid`](ErrorKind::Invalid) if it can't be deserialized as `T`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        if path.is_empty() {
            return self.figment.extract().or_raise(|| ErrorKind::Invalid(String::new()));
        }
        self.value(path)?;
        self.figment.extract_inner(path).or_raise(|| ErrorKind::Invalid(path.to_string()))
    }

    /// Untyped lookup of the value at a dotted path.
    pub fn value(&self, path: &str) -> Result<Value> {
        self.figment.find_value(path).or_raise(|| ErrorKind::Missing(path.to_string()))
    }

    /// Extract and validate a well-known [`Section`].
    pub fn section<T: Section>(&self) -> Result<T> {
        let section: T = self.get(T::PATH)?;
        section.validate().or_raise(|| ErrorKind::Invalid(T::PATH.to_string()))?;
        Ok(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;

    #[test]
    fn test_defaults_are_present() {
        let config = Config::from_toml_str("");
        let storage: StorageSettings = config.get("storage").unwrap();
        assert_eq!(storage.backend, "local");
        let worker: WorkerSettings = config.get("worker").unwrap();
        assert_eq!(worker.concurrency, 2);
        let download: String = config.get("download.program").unwrap();
        assert_eq!(download, "yt-dlp");
    }

    #[test]
    fn test_dotted_lookup() {
        let config = Config::from_toml_str(
            r#"
            [storage.s3]
            bucket = "videos"
            region = "eu-central-1"
            key_id = "id"
            key_secret = "secret"
            "#,
        );
        let bucket: String = config.get("storage.s3.bucket").unwrap();
        assert_eq!(bucket, "videos");
        let s3: S3Settings = config.section().unwrap();
        assert_eq!(s3.region, "eu-central-1");
        assert!(s3.prefix.is_none());
    }

    #[test]
    fn test_missing_path() {
        let config = Config::from_toml_str("");
        let err = config.get::<S3Settings>("storage.s3").unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Missing(path) if path == "storage.s3"));
    }

    #[test]
    fn test_empty_path_returns_whole_tree() {
        let config = Config::from_toml_str(
            r#"
            [youtube]
            api_key = "abc"
            "#,
        );
        let tree: Value = config.get("").unwrap();
        let dict = tree.into_dict().unwrap();
        assert!(dict.contains_key("youtube"));
        assert!(dict.contains_key("queue"));
    }

    #[test]
    fn test_section_validation() {
        let config = Config::from_toml_str(
            r#"
            [storage.s3]
            bucket = ""
            region = "us-east-1"
            key_id = "id"
            key_secret = "secret"
            "#,
        );
        let err = config.section::<S3Settings>().unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Invalid(path) if path == "storage.s3"));
    }

    #[test]
    fn test_load_file_and_environment() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "tubevault.yaml",
                r#"
                storage:
                  backend: dropbox
                  dropbox:
                    access_token: from-file
                "#,
            )?;
            jail.set_env("TUBEVAULT_STORAGE__DROPBOX__ACCESS_TOKEN", "from-env");
            let config = Config::load(Some(Path::new("tubevault.yaml"))).unwrap();
            let backend: String = config.get("storage.backend").unwrap();
            assert_eq!(backend, "dropbox");
            let dropbox: DropboxSettings = config.section().unwrap();
            assert_eq!(dropbox.access_token, "from-env");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "backend = local").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::UnsupportedFormat(_)));
    }
}
