//! Integration tests for the HTTP API
//!
//! Serves the full router on an ephemeral port and talks to it with reqwest.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Semaphore;

use common::{Harness, StubCatalog, hit, wait_for_scan};
use library_scanner::config::Config;
use library_scanner::db::LibraryKind;
use library_scanner::services::{MetadataResolver, ScannerService};
use library_scanner::services::tmdb::DEFAULT_TMDB_BASE_URL;
use library_scanner::{AppState, build_app};

fn test_config(harness: &Harness) -> Config {
    Config {
        port: 0,
        database_url: harness.dir.path().join("library.db").to_string_lossy().to_string(),
        tmdb_api_key: None,
        tmdb_base_url: DEFAULT_TMDB_BASE_URL.to_string(),
        tmdb_timeout: Duration::from_secs(10),
        scan_flush_every: 50,
        scan_on_startup: false,
    }
}

/// Serve the app and return its base URL
async fn serve(harness: &Harness, scanner: Arc<ScannerService>) -> String {
    serve_with_resolver(harness, scanner, MetadataResolver::disabled()).await
}

async fn serve_with_resolver(
    harness: &Harness,
    scanner: Arc<ScannerService>,
    resolver: MetadataResolver,
) -> String {
    let state = AppState {
        config: Arc::new(test_config(harness)),
        db: harness.db.clone(),
        scanner,
        resolver,
    };
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_reports_database() {
    let harness = Harness::new().await;
    let scanner = harness.scanner(StubCatalog::scenario().into_resolver());
    let base = serve(&harness, scanner).await;

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_trigger_scan_and_read_results() {
    let harness = Harness::new().await;
    let library = harness.library("Mixed", LibraryKind::Movie, "media").await;
    harness.write_file(&library, "Movie.Name.2020.1080p.mkv", 1);
    harness.write_file(&library, "Show.S01E01.mkv", 1);

    let gate = Arc::new(Semaphore::new(0));
    let catalog = StubCatalog::scenario().gated(Arc::clone(&gate));
    let scanner = harness.scanner(catalog.into_resolver());
    let base = serve(&harness, Arc::clone(&scanner)).await;
    let client = reqwest::Client::new();
    let scan_url = format!("{}/api/libraries/{}/scan", base, library.id);

    let response = client.post(&scan_url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "started");
    assert_eq!(body["library_id"], library.id.to_string());

    let response = client.post(&scan_url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "already_running");

    gate.add_permits(10);
    wait_for_scan(&scanner, library.id).await;

    let scans: Value = client
        .get(format!("{}/api/libraries/{}/scans", base, library.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let scans = scans.as_array().unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0]["status"], "succeeded");
    assert_eq!(scans[0]["stats"]["files"], 2);
    assert_eq!(scans[0]["stats"]["matched"], 2);
    assert!(scans[0]["finished_at"].is_string());

    let items: Value = client
        .get(format!("{}/api/libraries/{}/items?limit=1", base, library.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0]["rel_path"].is_string());
}

#[tokio::test]
async fn test_failed_scan_is_reported_through_history() {
    let harness = Harness::new().await;
    let library = harness.library("Movies", LibraryKind::Movie, "movies").await;
    std::fs::remove_dir_all(harness.mount().join("movies")).unwrap();

    let scanner = harness.scanner(StubCatalog::scenario().into_resolver());
    let base = serve(&harness, Arc::clone(&scanner)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/libraries/{}/scan", base, library.id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    wait_for_scan(&scanner, library.id).await;

    let scans: Value = client
        .get(format!("{}/api/libraries/{}/scans", base, library.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(scans[0]["status"], "failed");
    assert!(scans[0]["stats"]["error"].is_string());
}

#[tokio::test]
async fn test_invalid_library_id_is_rejected() {
    let harness = Harness::new().await;
    let scanner = harness.scanner(StubCatalog::scenario().into_resolver());
    let base = serve(&harness, scanner).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/libraries/not-a-uuid/scan", base))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_catalog_search_merges_movies_and_shows() {
    let harness = Harness::new().await;
    let catalog = StubCatalog::default()
        .with_movie("Name", hit(1, "Name", "2001-01-01", 2.0))
        .with_movie("Name", hit(2, "Name Returns", "2004-01-01", 8.0))
        .with_show("Name", hit(3, "Name", "2010-01-01", 5.0));
    let resolver = catalog.into_resolver();
    let scanner = harness.scanner(resolver.clone());
    let base = serve_with_resolver(&harness, scanner, resolver).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/api/tmdb/search?q=Name&media_type=multi", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["query"], "Name");
    assert_eq!(body["media_type"], "multi");
    let results = body["results"].as_array().unwrap();
    let tagged: Vec<_> = results
        .iter()
        .map(|r| (r["id"].as_i64().unwrap(), r["media_type"].as_str().unwrap()))
        .collect();
    assert_eq!(tagged, vec![(2, "movie"), (3, "tv"), (1, "movie")]);

    // `query` is accepted in place of `q`
    let body: Value = client
        .get(format!("{}/api/tmdb/search?query=Name&media_type=tv", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["media_type"], "tv");
    assert_eq!(results[0]["title"], "Name");

    let body: Value = client
        .get(format!("{}/api/tmdb/search?q=%20%20", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["results"], serde_json::json!([]));
}

#[tokio::test]
async fn test_catalog_search_without_key_is_empty() {
    let harness = Harness::new().await;
    let scanner = harness.scanner(MetadataResolver::disabled());
    let base = serve(&harness, scanner).await;

    let response = reqwest::get(format!("{}/api/tmdb/search?q=Name", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["media_type"], "multi");
    assert_eq!(body["results"], serde_json::json!([]));
}

#[tokio::test]
async fn test_catalog_search_failure_is_empty() {
    let harness = Harness::new().await;
    let resolver = StubCatalog::scenario().failing_on("Show").into_resolver();
    let scanner = harness.scanner(resolver.clone());
    let base = serve_with_resolver(&harness, scanner, resolver).await;

    let response = reqwest::get(format!("{}/api/tmdb/search?q=Show&media_type=tv", base))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["results"], serde_json::json!([]));
}
