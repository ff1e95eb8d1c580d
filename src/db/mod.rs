//! Database connection and operations

pub mod disks;
pub mod libraries;
pub mod media_files;
pub mod media_items;
pub mod scans;
pub mod series;
pub mod sqlite_helpers;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

pub use disks::{CreateDisk, DiskRecord, DiskRepository};
pub use libraries::{CreateLibrary, LibraryKind, LibraryRecord, LibraryRepository, LibrarySettings};
pub use media_files::{LibraryItemRow, MediaFileRecord, MediaFileRepository, UpsertMediaFile};
pub use media_items::{CreateMediaItem, MediaItemRecord, MediaItemRepository, MediaKind};
pub use scans::{ScanRecord, ScanRepository, ScanStatistics, ScanStatus};
pub use series::{CreateSeries, SeriesRecord, SeriesRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5)
    }

    /// Build connect options from either a `sqlite:` URL or a plain file path
    fn connect_options(url: &str) -> Result<SqliteConnectOptions> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .with_context(|| format!("Invalid SQLite URL '{}'", url))?
        } else {
            if let Some(parent) = Path::new(url).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
            SqliteConnectOptions::new().filename(url)
        };

        // Concurrent scans of different libraries queue on the write lock
        Ok(options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true))
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str) -> Result<Self> {
        let max_connections = Self::get_max_connections();
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(Self::connect_options(url)?)
            .await
            .with_context(|| format!("Failed to open database at {}", url))?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction on the pool
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Get a disk repository
    pub fn disks(&self) -> DiskRepository {
        DiskRepository::new(self.pool.clone())
    }

    /// Get a library repository
    pub fn libraries(&self) -> LibraryRepository {
        LibraryRepository::new(self.pool.clone())
    }

    /// Get a series repository
    pub fn series(&self) -> SeriesRepository {
        SeriesRepository::new(self.pool.clone())
    }

    /// Get a media items repository
    pub fn media_items(&self) -> MediaItemRepository {
        MediaItemRepository::new(self.pool.clone())
    }

    /// Get a media files repository
    pub fn media_files(&self) -> MediaFileRepository {
        MediaFileRepository::new(self.pool.clone())
    }

    /// Get a library scan repository
    pub fn scans(&self) -> ScanRepository {
        ScanRepository::new(self.pool.clone())
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}
