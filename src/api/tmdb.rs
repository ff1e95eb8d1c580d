//! Catalog search endpoint

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::services::{SearchHit, SearchMediaType};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    /// Alias of `q`
    pub query: Option<String>,
    #[serde(default)]
    pub media_type: SearchMediaType,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub media_type: SearchMediaType,
    pub results: Vec<SearchHit>,
}

/// Search the catalog by free text.
///
/// Catalog failures answer with an empty result list.
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Json<SearchResponse> {
    let query = params
        .q
        .or(params.query)
        .unwrap_or_default()
        .trim()
        .to_string();

    let results = match state.resolver.search(&query, params.media_type).await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(query = %query, error = %e, "Catalog search failed");
            Vec::new()
        }
    };

    Json(SearchResponse {
        query,
        media_type: params.media_type,
        results,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/tmdb/search", get(search))
}
