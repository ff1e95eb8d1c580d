//! Library scanner - HTTP entry point
//!
//! Serves the scan endpoints and runs scans as background tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_scanner::config::Config;
use library_scanner::db::Database;
use library_scanner::services::{MetadataResolver, create_scanner_service};
use library_scanner::{AppState, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_scanner=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting library scanner");

    let config = Arc::new(Config::from_env()?);
    tracing::info!("Configuration loaded");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    tracing::info!(path = %config.database_url, "Database connected");

    let resolver = MetadataResolver::new(&config.metadata())?;
    if !resolver.is_enabled() {
        tracing::warn!("TMDB_API_KEY not set - files will be scanned but not matched");
    }

    let scanner = create_scanner_service(db.clone(), resolver.clone(), config.scanner());
    tracing::info!("Scanner service initialized");

    if config.scan_on_startup {
        let scanner = scanner.clone();
        tokio::spawn(async move {
            if let Err(e) = scanner.scan_all_libraries().await {
                tracing::error!(error = %e, "Startup scan failed");
            }
        });
    }

    let state = AppState {
        config: config.clone(),
        db,
        scanner,
        resolver,
    };
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
