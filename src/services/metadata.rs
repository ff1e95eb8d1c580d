//! Metadata resolution
//!
//! Turns a title/year guess into the best matching catalog entry. The catalog
//! is reached through [`CatalogSearch`] and results are ranked by a
//! [`MatchScorer`]; both are injected so tests and alternative catalogs can
//! stand in for TMDB.
//!
//! Resolution fails closed: without a catalog credential, or for a blank
//! title, the resolver answers `None` without issuing a request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::tmdb::{DEFAULT_TMDB_BASE_URL, TmdbClient};

/// Weight of the year signal relative to raw popularity
pub const YEAR_WEIGHT: f64 = 50.0;

/// Years further apart than this contribute nothing
const YEAR_WINDOW: f64 = 10.0;

/// Catalog lookup failures
#[derive(Debug, Error)]
pub enum CatalogError {
    /// 429 or 5xx, still failing after the retry budget
    #[error("catalog temporarily unavailable (HTTP {status})")]
    Transient { status: u16 },
    /// Any other non-success status
    #[error("catalog request failed (HTTP {status})")]
    Status { status: u16 },
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed catalog response: {0}")]
    Decode(String),
}

impl CatalogError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Transient { .. })
    }
}

/// Injected resolver configuration
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// TMDB API key; `None` or empty disables resolution
    pub tmdb_api_key: Option<String>,
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            base_url: DEFAULT_TMDB_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// One search result as returned by a catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogHit {
    pub id: i64,
    /// Movie title or series name
    pub title: String,
    /// Release or first-air date, `YYYY-MM-DD` when known
    pub date: Option<String>,
    pub popularity: f64,
}

impl CatalogHit {
    /// Year from the first four characters of the date; `0000` and junk are unknown
    pub fn year(&self) -> Option<i32> {
        self.date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse::<i32>().ok())
            .filter(|y| *y > 0)
    }
}

/// Which catalog sections a free-text search covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMediaType {
    /// Movies and series, merged by popularity
    #[default]
    Multi,
    Movie,
    Tv,
}

/// A search result tagged with the section it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub media_type: SearchMediaType,
    #[serde(flatten)]
    pub hit: CatalogHit,
}

impl SearchHit {
    fn tagged(media_type: SearchMediaType, hits: Vec<CatalogHit>) -> impl Iterator<Item = Self> {
        hits.into_iter().map(move |hit| Self { media_type, hit })
    }
}

/// The chosen catalog entry for a guess
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub popularity: f64,
    pub score: f64,
}

/// Search operations of an external metadata catalog
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn search_movies(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<Vec<CatalogHit>, CatalogError>;

    async fn search_tv(&self, query: &str) -> Result<Vec<CatalogHit>, CatalogError>;
}

/// Ranks catalog hits against a guess; higher is better
pub trait MatchScorer: Send + Sync {
    fn score(&self, hit: &CatalogHit, guess_year: Option<i32>) -> f64;
}

/// Linear year agreement over a ten year window.
///
/// 1.0 for the same year, 0.0 at ten or more years apart or when either year
/// is unknown.
pub fn year_proximity(guess_year: Option<i32>, hit_year: Option<i32>) -> f64 {
    match (guess_year, hit_year) {
        (Some(a), Some(b)) => {
            let delta = (a - b).unsigned_abs() as f64;
            (1.0 - delta.min(YEAR_WINDOW) / YEAR_WINDOW).max(0.0)
        }
        _ => 0.0,
    }
}

/// `popularity + 50 * year_proximity`: popularity as the prior, year
/// agreement as the corrective
#[derive(Debug, Clone, Copy, Default)]
pub struct PopularityYearScorer;

impl MatchScorer for PopularityYearScorer {
    fn score(&self, hit: &CatalogHit, guess_year: Option<i32>) -> f64 {
        hit.popularity + YEAR_WEIGHT * year_proximity(guess_year, hit.year())
    }
}

/// Resolves guesses to catalog candidates
#[derive(Clone)]
pub struct MetadataResolver {
    catalog: Option<Arc<dyn CatalogSearch>>,
    scorer: Arc<dyn MatchScorer>,
}

impl MetadataResolver {
    /// Build a TMDB-backed resolver, or a disabled one when no key is set
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let catalog = match config.tmdb_api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                let client = TmdbClient::new(key.to_string(), config.base_url.clone(), config.timeout)?;
                Some(Arc::new(client) as Arc<dyn CatalogSearch>)
            }
            _ => None,
        };

        Ok(Self {
            catalog,
            scorer: Arc::new(PopularityYearScorer),
        })
    }

    /// Resolver over an arbitrary catalog and scorer
    pub fn with_catalog(catalog: Arc<dyn CatalogSearch>, scorer: Arc<dyn MatchScorer>) -> Self {
        Self {
            catalog: Some(catalog),
            scorer,
        }
    }

    /// Resolver that never matches
    pub fn disabled() -> Self {
        Self {
            catalog: None,
            scorer: Arc::new(PopularityYearScorer),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.catalog.is_some()
    }

    /// Best movie for a title, scoping the search by year when known
    pub async fn resolve_movie(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<Candidate>, CatalogError> {
        let Some(catalog) = self.catalog.as_ref() else {
            return Ok(None);
        };
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }

        let hits = catalog.search_movies(title, year).await?;
        Ok(self.pick_best(title, hits, year))
    }

    /// Best series for a title; the year only affects scoring
    pub async fn resolve_tv(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<Candidate>, CatalogError> {
        let Some(catalog) = self.catalog.as_ref() else {
            return Ok(None);
        };
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }

        let hits = catalog.search_tv(title).await?;
        Ok(self.pick_best(title, hits, year))
    }

    /// Free-text catalog search.
    ///
    /// A single section keeps the catalog's order; `Multi` queries both
    /// sections and orders the merged hits by popularity, movies first on a
    /// tie. Blank queries and a disabled resolver yield no hits.
    pub async fn search(
        &self,
        query: &str,
        media_type: SearchMediaType,
    ) -> Result<Vec<SearchHit>, CatalogError> {
        let Some(catalog) = self.catalog.as_ref() else {
            return Ok(Vec::new());
        };
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let results = match media_type {
            SearchMediaType::Movie => {
                let movies = catalog.search_movies(query, None).await?;
                SearchHit::tagged(SearchMediaType::Movie, movies).collect()
            }
            SearchMediaType::Tv => {
                let shows = catalog.search_tv(query).await?;
                SearchHit::tagged(SearchMediaType::Tv, shows).collect()
            }
            SearchMediaType::Multi => {
                let (movies, shows) =
                    tokio::join!(catalog.search_movies(query, None), catalog.search_tv(query));
                let mut merged: Vec<SearchHit> = SearchHit::tagged(SearchMediaType::Movie, movies?)
                    .chain(SearchHit::tagged(SearchMediaType::Tv, shows?))
                    .collect();
                merged.sort_by(|a, b| b.hit.popularity.total_cmp(&a.hit.popularity));
                merged
            }
        };

        debug!(query = query, media_type = ?media_type, count = results.len(), "Catalog search");
        Ok(results)
    }

    /// Highest score wins; on a tie the earlier hit is kept
    fn pick_best(&self, query: &str, hits: Vec<CatalogHit>, guess_year: Option<i32>) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;

        for hit in hits {
            let score = self.scorer.score(&hit, guess_year);
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(Candidate {
                    tmdb_id: hit.id,
                    year: hit.year(),
                    title: hit.title,
                    popularity: hit.popularity,
                    score,
                });
            }
        }

        debug!(
            query = query,
            guess_year = ?guess_year,
            tmdb_id = ?best.as_ref().map(|c| c.tmdb_id),
            score = ?best.as_ref().map(|c| c.score),
            "Resolved catalog candidate"
        );

        best
    }
}
