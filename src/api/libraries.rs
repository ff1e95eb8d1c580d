//! Library scan endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::db::{LibraryItemRow, ScanRecord};
use crate::services::ScanTrigger;
use crate::services::scanner::{DEFAULT_ITEM_LIST_LIMIT, DEFAULT_SCAN_LIST_LIMIT};

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub library_id: Uuid,
    pub status: ScanTrigger,
}

#[derive(Debug, Deserialize)]
pub struct ListScansQuery {
    #[serde(default = "default_scan_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    #[serde(default = "default_item_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_scan_limit() -> i64 {
    DEFAULT_SCAN_LIST_LIMIT
}

fn default_item_limit() -> i64 {
    DEFAULT_ITEM_LIST_LIMIT
}

/// Start a background scan; the scan records report how it went
async fn trigger_scan(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
) -> (StatusCode, Json<ScanResponse>) {
    let status = state.scanner.trigger_scan(library_id);
    let code = match status {
        ScanTrigger::Started => StatusCode::ACCEPTED,
        ScanTrigger::AlreadyRunning => StatusCode::CONFLICT,
    };

    (code, Json(ScanResponse { library_id, status }))
}

/// Scan history of a library, most recent first
async fn list_scans(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Query(query): Query<ListScansQuery>,
) -> Result<Json<Vec<ScanRecord>>, (StatusCode, String)> {
    state
        .scanner
        .list_scans(library_id, query.limit)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(library_id = %library_id, error = %e, "Failed to list scans");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

/// Matched files of a library, newest first
async fn list_items(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<Vec<LibraryItemRow>>, (StatusCode, String)> {
    state
        .scanner
        .list_items(library_id, query.limit, query.offset)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(library_id = %library_id, error = %e, "Failed to list library items");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/libraries/{id}/scan", post(trigger_scan))
        .route("/libraries/{id}/scans", get(list_scans))
        .route("/libraries/{id}/items", get(list_items))
}
