//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use uuid::Uuid;

use library_scanner::db::{CreateDisk, CreateLibrary, Database, DiskRecord, LibraryKind, LibraryRecord, LibrarySettings};
use library_scanner::services::{
    CatalogError, CatalogHit, CatalogSearch, MetadataResolver, PopularityYearScorer, ScannerConfig,
    ScannerService,
};

/// Temporary database plus a directory acting as a disk mount
pub struct Harness {
    pub dir: TempDir,
    pub db: Database,
    pub disk: DiskRecord,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::connect(dir.path().join("library.db").to_str().unwrap())
            .await
            .unwrap();
        db.migrate().await.unwrap();

        let mount = dir.path().join("disk");
        std::fs::create_dir_all(&mount).unwrap();
        let disk = db
            .disks()
            .create(CreateDisk {
                name: "disk1".to_string(),
                mount_path: mount.to_string_lossy().to_string(),
            })
            .await
            .unwrap();

        Self { dir, db, disk }
    }

    /// Create a library under `<mount>/<subdir>`, creating the directory
    pub async fn library(&self, name: &str, kind: LibraryKind, subdir: &str) -> LibraryRecord {
        std::fs::create_dir_all(self.mount().join(subdir)).unwrap();
        self.db
            .libraries()
            .create(CreateLibrary {
                name: name.to_string(),
                kind,
                disk_id: self.disk.id,
                root_subdir: subdir.to_string(),
                settings: LibrarySettings::new(),
            })
            .await
            .unwrap()
    }

    pub fn mount(&self) -> PathBuf {
        PathBuf::from(&self.disk.mount_path)
    }

    /// Write a file of `size` bytes below a library root
    pub fn write_file(&self, library: &LibraryRecord, rel_path: &str, size: usize) {
        let path = library.root_on(&self.disk.mount_path).join(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, vec![0u8; size]).unwrap();
    }

    pub fn scanner(&self, resolver: MetadataResolver) -> Arc<ScannerService> {
        self.scanner_with_config(resolver, ScannerConfig::default())
    }

    pub fn scanner_with_config(&self, resolver: MetadataResolver, config: ScannerConfig) -> Arc<ScannerService> {
        Arc::new(ScannerService::new(self.db.clone(), resolver, config))
    }

    /// (series, media_items, media_files) row counts
    pub async fn counts(&self) -> (i64, i64, i64) {
        (
            self.db.series().count().await.unwrap(),
            self.db.media_items().count().await.unwrap(),
            self.db.media_files().count().await.unwrap(),
        )
    }
}

pub fn hit(id: i64, title: &str, date: &str, popularity: f64) -> CatalogHit {
    CatalogHit {
        id,
        title: title.to_string(),
        date: Some(date.to_string()),
        popularity,
    }
}

/// In-memory catalog keyed by query text
#[derive(Default)]
pub struct StubCatalog {
    pub movies: HashMap<String, Vec<CatalogHit>>,
    pub shows: HashMap<String, Vec<CatalogHit>>,
    /// Queries that fail with a permanent error
    pub failing: Vec<String>,
    /// When set, searches wait for a permit first
    pub gate: Option<Arc<Semaphore>>,
    /// Queries the gate applies to; empty means every query
    pub gated_queries: Vec<String>,
    /// Queries whose search panics
    pub panicking: Vec<String>,
    pub calls: AtomicU32,
}

impl StubCatalog {
    /// Movie 42 "Movie Name" (2020) and series 7 "Show" (2019)
    pub fn scenario() -> Self {
        let mut catalog = Self::default();
        catalog
            .movies
            .insert("Movie Name".to_string(), vec![hit(42, "Movie Name", "2020-01-01", 10.0)]);
        catalog
            .shows
            .insert("Show".to_string(), vec![hit(7, "Show", "2019-01-01", 5.0)]);
        catalog
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Gate only searches for `query`
    pub fn gated_on(mut self, query: &str, gate: Arc<Semaphore>) -> Self {
        self.gated_queries.push(query.to_string());
        self.gated(gate)
    }

    pub fn panicking_on(mut self, query: &str) -> Self {
        self.panicking.push(query.to_string());
        self
    }

    pub fn with_movie(mut self, query: &str, hit: CatalogHit) -> Self {
        self.movies.entry(query.to_string()).or_default().push(hit);
        self
    }

    pub fn with_show(mut self, query: &str, hit: CatalogHit) -> Self {
        self.shows.entry(query.to_string()).or_default().push(hit);
        self
    }

    pub fn into_resolver(self) -> MetadataResolver {
        MetadataResolver::with_catalog(Arc::new(self), Arc::new(PopularityYearScorer))
    }

    async fn lookup(
        &self,
        table: &HashMap<String, Vec<CatalogHit>>,
        query: &str,
    ) -> Result<Vec<CatalogHit>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate
            && (self.gated_queries.is_empty() || self.gated_queries.iter().any(|q| q == query))
        {
            gate.acquire().await.unwrap().forget();
        }
        if self.panicking.iter().any(|q| q == query) {
            panic!("catalog search for {} panicked", query);
        }
        if self.failing.iter().any(|q| q == query) {
            return Err(CatalogError::Status { status: 404 });
        }
        Ok(table.get(query).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl CatalogSearch for StubCatalog {
    async fn search_movies(
        &self,
        query: &str,
        _year: Option<i32>,
    ) -> Result<Vec<CatalogHit>, CatalogError> {
        self.lookup(&self.movies, query).await
    }

    async fn search_tv(&self, query: &str) -> Result<Vec<CatalogHit>, CatalogError> {
        self.lookup(&self.shows, query).await
    }
}

/// Poll until `check` holds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Poll until no scan of `library_id` is running
pub async fn wait_for_scan(scanner: &ScannerService, library_id: Uuid) {
    for _ in 0..500 {
        if !scanner.is_scanning(library_id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan of {} did not finish", library_id);
}
