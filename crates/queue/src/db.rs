//! SQLite pool holding the `jobs` table.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Pool size for file databases. Claims and completions are single-row
/// writes, so a handful of connections covers any worker concurrency.
const FILE_CONNECTIONS: u32 = 4;
const CONNECTION_PRAGMAS: &str = "
    PRAGMA wal_autocheckpoint = 400;
    PRAGMA cache_size = -2048;
    PRAGMA temp_store = MEMORY;
";
/// Claiming a job writes; concurrent workers wait on each other's locks.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool backing one or more [`JobQueue`](crate::JobQueue)s.
///
/// Several named queues can live in the same database file; hand the same
/// `Database` to each of them.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the queue database at `path`, creating missing
    /// parent directories and applying migrations.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
        }
        let options = Self::options()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Self::open(options, FILE_CONNECTIONS).await
    }

    /// Private in-memory database, gone once the pool closes.
    ///
    /// Limited to a single connection: every new `:memory:` connection would
    /// otherwise see its own, empty database. Not test-only, so that other
    /// crates can use it in their tests too.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            // Succeeded jobs pile up; let `close()` hand freed pages back.
            .auto_vacuum(SqliteAutoVacuum::Incremental)
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Per-connection settings with no SqliteConnectOptions setter.
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query(CONNECTION_PRAGMAS).execute(conn).await?;
                    Ok(())
                })
            })
            .max_connections(connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reclaim free pages and close every connection.
    pub async fn close(&self) {
        if let Err(e) = sqlx::query("PRAGMA incremental_vacuum").execute(&self.pool).await {
            tracing::debug!(error = %e, "Skipping incremental vacuum");
        }
        self.pool.close().await;
    }
}
