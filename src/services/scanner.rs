//! Library scanner service
//!
//! Walks a library's root directory, parses each video filename, resolves it
//! against the metadata catalog and reconciles the match into the database.
//!
//! Every scan is recorded in `library_scans`: the record starts `running`,
//! its statistics are flushed every `flush_every` files, and it ends
//! `succeeded` or `failed`. Catalog lookups run with no transaction open;
//! each matched file is then written in its own short transaction, so a scan
//! waiting on the catalog never holds the database write lock. A failed
//! lookup skips the file, a failed write is rolled back and counted, and the
//! walk moves on. Only an unusable library (missing record, missing disk,
//! root not a directory) or a scan-record storage failure fails the scan.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::filename_parser::{self, Guess};
use super::metadata::MetadataResolver;
use super::reconciler::{self, FileStat};
use crate::db::{Database, LibraryItemRow, MediaKind, ScanRecord, ScanStatistics, ScanStatus};

/// Video file extensions we recognize
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "m4v", "ts", "webm"];

pub const DEFAULT_SCAN_LIST_LIMIT: i64 = 20;
pub const MAX_SCAN_LIST_LIMIT: i64 = 100;
pub const DEFAULT_ITEM_LIST_LIMIT: i64 = 50;
pub const MAX_ITEM_LIST_LIMIT: i64 = 200;

/// Scanner tuning
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Files processed between statistics flushes
    pub flush_every: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { flush_every: 50 }
    }
}

/// Errors that end a scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a scan of library {0} is already running")]
    AlreadyRunning(Uuid),
    #[error("library {0} not found")]
    LibraryNotFound(Uuid),
    #[error("disk {disk_id} for library {library_id} not found")]
    DiskNotFound { library_id: Uuid, disk_id: Uuid },
    #[error("library root {} is not an existing directory", .0.display())]
    RootUnavailable(PathBuf),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Acknowledgement of a scan request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTrigger {
    Started,
    AlreadyRunning,
}

/// Why a file was left unmatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    NoTitle,
    NoMatch,
    LookupFailed,
    MissingEpisodeNumbers,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoTitle => "no title",
            SkipReason::NoMatch => "no catalog match",
            SkipReason::LookupFailed => "catalog lookup failed",
            SkipReason::MissingEpisodeNumbers => "no season/episode",
        }
    }
}

#[derive(Debug)]
enum FileOutcome {
    Matched(MediaKind),
    Skipped(SkipReason),
}

/// A video file found by the walk
#[derive(Debug, Clone)]
struct WalkedFile {
    file_name: String,
    stat: FileStat,
}

type ActiveScans = Arc<Mutex<HashSet<Uuid>>>;

/// Marks a library as being scanned until dropped
pub struct LibraryScanGuard {
    active: ActiveScans,
    library_id: Uuid,
}

impl LibraryScanGuard {
    fn try_acquire(active: &ActiveScans, library_id: Uuid) -> Option<Self> {
        if !active.lock().insert(library_id) {
            return None;
        }
        Some(Self {
            active: Arc::clone(active),
            library_id,
        })
    }
}

impl Drop for LibraryScanGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.library_id);
    }
}

/// Scanner service for discovering and matching media files
pub struct ScannerService {
    db: Database,
    resolver: MetadataResolver,
    config: ScannerConfig,
    active: ActiveScans,
}

impl ScannerService {
    /// Create a new scanner service
    pub fn new(db: Database, resolver: MetadataResolver, config: ScannerConfig) -> Self {
        Self {
            db,
            resolver,
            config,
            active: Arc::default(),
        }
    }

    /// Whether a scan of the library is in progress
    pub fn is_scanning(&self, library_id: Uuid) -> bool {
        self.active.lock().contains(&library_id)
    }

    /// Start a background scan and return immediately.
    ///
    /// The outcome is only observable through the library's scan records. A
    /// scan task that panics has its record closed as `failed`.
    pub fn trigger_scan(self: &Arc<Self>, library_id: Uuid) -> ScanTrigger {
        let Some(guard) = LibraryScanGuard::try_acquire(&self.active, library_id) else {
            info!(library_id = %library_id, "Scan already running, not starting another");
            return ScanTrigger::AlreadyRunning;
        };

        let scanner = Arc::clone(self);
        tokio::spawn(async move {
            // Held until the record is final, including after a panic
            let _guard = guard;

            let worker = Arc::clone(&scanner);
            match tokio::spawn(async move { worker.run_scan(library_id).await }).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!(library_id = %library_id, error = %e, "Background library scan failed");
                }
                Err(join_err) => {
                    error!(library_id = %library_id, error = %join_err, "Library scan task aborted");
                    if let Err(e) = scanner
                        .db
                        .scans()
                        .fail_running(library_id, "scan task aborted")
                        .await
                    {
                        error!(library_id = %library_id, error = %e, "Failed to close aborted scan record");
                    }
                }
            }
        });

        ScanTrigger::Started
    }

    /// Scan a library to completion
    pub async fn scan_library(&self, library_id: Uuid) -> Result<ScanStatistics, ScanError> {
        let _guard = LibraryScanGuard::try_acquire(&self.active, library_id)
            .ok_or(ScanError::AlreadyRunning(library_id))?;
        self.run_scan(library_id).await
    }

    /// Scan every library one after another, logging failures
    pub async fn scan_all_libraries(&self) -> anyhow::Result<()> {
        let libraries = self.db.libraries().list().await?;
        info!(count = libraries.len(), "Scanning all libraries");

        for library in libraries {
            if let Err(e) = self.scan_library(library.id).await {
                error!(library_id = %library.id, library = %library.name, error = %e, "Library scan failed");
            }
        }

        Ok(())
    }

    /// Most recent scan records of a library
    pub async fn list_scans(&self, library_id: Uuid, limit: i64) -> anyhow::Result<Vec<ScanRecord>> {
        self.db
            .scans()
            .list_by_library(library_id, limit.clamp(1, MAX_SCAN_LIST_LIMIT))
            .await
    }

    /// Matched files of a library, newest first
    pub async fn list_items(
        &self,
        library_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<LibraryItemRow>> {
        self.db
            .media_files()
            .list_items(library_id, limit.clamp(1, MAX_ITEM_LIST_LIMIT), offset.max(0))
            .await
    }

    /// Runs one scan; the caller holds the library's guard
    async fn run_scan(&self, library_id: Uuid) -> Result<ScanStatistics, ScanError> {
        let scan = self.db.scans().create_running(library_id).await?;
        info!(library_id = %library_id, scan_id = %scan.id, "Starting library scan");

        let mut stats = ScanStatistics::default();
        match self.execute(library_id, scan.id, &mut stats).await {
            Ok(()) => {
                self.db
                    .scans()
                    .finish(scan.id, ScanStatus::Succeeded, &stats)
                    .await?;
                info!(
                    library_id = %library_id,
                    scan_id = %scan.id,
                    files = stats.files,
                    movies = stats.movies,
                    episodes = stats.episodes,
                    skipped = stats.skipped,
                    errors = stats.errors,
                    "Library scan complete"
                );
                Ok(stats)
            }
            Err(e) => {
                stats.error = Some(e.to_string());
                if let Err(finish_err) = self
                    .db
                    .scans()
                    .finish(scan.id, ScanStatus::Failed, &stats)
                    .await
                {
                    error!(scan_id = %scan.id, error = %finish_err, "Failed to record scan failure");
                }
                error!(library_id = %library_id, scan_id = %scan.id, error = %e, "Library scan failed");
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        library_id: Uuid,
        scan_id: Uuid,
        stats: &mut ScanStatistics,
    ) -> Result<(), ScanError> {
        let root = self.resolve_root(library_id).await?;

        let walk_root = root.clone();
        let files = tokio::task::spawn_blocking(move || walk_library(&walk_root))
            .await
            .context("Directory walk task failed")?;
        info!(library_id = %library_id, root = %root.display(), total = files.len(), "Found video files to scan");

        self.process_files(library_id, scan_id, &files, stats).await
    }

    /// Library root from its disk mount and subdirectory
    async fn resolve_root(&self, library_id: Uuid) -> Result<PathBuf, ScanError> {
        let library = self
            .db
            .libraries()
            .get_by_id(library_id)
            .await?
            .ok_or(ScanError::LibraryNotFound(library_id))?;

        let disk = self
            .db
            .disks()
            .get_by_id(library.disk_id)
            .await?
            .ok_or(ScanError::DiskNotFound {
                library_id,
                disk_id: library.disk_id,
            })?;

        let root = library.root_on(&disk.mount_path);
        let is_dir = tokio::fs::metadata(&root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ScanError::RootUnavailable(root));
        }

        Ok(root)
    }

    async fn process_files(
        &self,
        library_id: Uuid,
        scan_id: Uuid,
        files: &[WalkedFile],
        stats: &mut ScanStatistics,
    ) -> Result<(), ScanError> {
        let flush_every = self.config.flush_every.max(1);

        for (index, file) in files.iter().enumerate() {
            stats.files += 1;

            match self.process_file(library_id, file).await {
                Ok(FileOutcome::Matched(kind)) => {
                    match kind {
                        MediaKind::Movie => stats.movies += 1,
                        MediaKind::Episode => stats.episodes += 1,
                    }
                    stats.matched += 1;
                }
                Ok(FileOutcome::Skipped(reason)) => {
                    debug!(path = %file.stat.rel_path, reason = reason.as_str(), "Skipped file");
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(path = %file.stat.rel_path, error = %e, "Failed to process file");
                    stats.errors += 1;
                }
            }

            if (index + 1) % flush_every == 0 {
                self.db.scans().update_stats(scan_id, stats).await?;
                debug!(scan_id = %scan_id, files = stats.files, "Flushed scan progress");
            }
        }

        Ok(())
    }

    /// Parse and resolve one file, then reconcile it in its own transaction
    async fn process_file(&self, library_id: Uuid, file: &WalkedFile) -> anyhow::Result<FileOutcome> {
        let guess = filename_parser::parse(&file.file_name);

        let Some(title) = guess.title.as_deref() else {
            return Ok(FileOutcome::Skipped(SkipReason::NoTitle));
        };
        if guess.kind == MediaKind::Episode && (guess.season.is_none() || guess.episode.is_none()) {
            return Ok(FileOutcome::Skipped(SkipReason::MissingEpisodeNumbers));
        }

        let lookup = match guess.kind {
            MediaKind::Movie => self.resolver.resolve_movie(title, guess.year).await,
            MediaKind::Episode => self.resolver.resolve_tv(title, guess.year).await,
        };
        let candidate = match lookup {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return Ok(FileOutcome::Skipped(SkipReason::NoMatch)),
            Err(e) => {
                warn!(path = %file.stat.rel_path, title = title, error = %e, "Catalog lookup failed");
                return Ok(FileOutcome::Skipped(SkipReason::LookupFailed));
            }
        };

        let mut tx = self.db.begin().await?;
        let file_id = match reconciler::reconcile(&mut tx, library_id, &candidate, &guess, &file.stat).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(path = %file.stat.rel_path, error = %rollback_err, "Failed to roll back file writes");
                }
                return Err(e);
            }
        };
        tx.commit().await.context("Failed to commit file writes")?;

        log_match(file, &guess, candidate.tmdb_id, file_id);
        Ok(FileOutcome::Matched(guess.kind))
    }
}

fn log_match(file: &WalkedFile, guess: &Guess, tmdb_id: i64, file_id: Uuid) {
    debug!(
        path = %file.stat.rel_path,
        kind = %guess.kind,
        tmdb_id = tmdb_id,
        season = ?guess.season,
        episode = ?guess.episode,
        file_id = %file_id,
        "Matched file"
    );
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Recursively collect video files under `root`, following symlinks.
///
/// Entries that cannot be read or that vanish before they are stat'ed are
/// left out.
fn walk_library(root: &Path) -> Vec<WalkedFile> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_video_extension(entry.path()))
        .filter_map(|entry| {
            let metadata = std::fs::metadata(entry.path()).ok()?;
            let rel_path = relative_path(root, entry.path())?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64);

            Some(WalkedFile {
                file_name: entry.file_name().to_string_lossy().to_string(),
                stat: FileStat {
                    rel_path,
                    size: metadata.len() as i64,
                    mtime,
                },
            })
        })
        .collect()
}

/// `/`-joined path of `path` below `root`
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Create a shared scanner service
pub fn create_scanner_service(
    db: Database,
    resolver: MetadataResolver,
    config: ScannerConfig,
) -> Arc<ScannerService> {
    Arc::new(ScannerService::new(db, resolver, config))
}
