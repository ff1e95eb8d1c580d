//! API route definitions
//!
//! A thin REST surface over the scanner: trigger a scan, list a library's
//! scan history, browse what the scans matched, and search the catalog.

pub mod health;
pub mod libraries;
pub mod tmdb;

use axum::Router;

use crate::AppState;

/// Routes mounted under `/api`
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(libraries::router())
        .merge(tmdb::router())
}
