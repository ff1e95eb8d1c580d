//! TMDB (The Movie Database) search client
//!
//! TMDB is a popular movie/TV database with a free API.
//! Base URL: https://api.themoviedb.org/3
//!
//! Rate limiting: TMDB allows ~40 requests per 10 seconds. Requests go through
//! a rate-limited client and 429/5xx responses are retried with backoff.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::metadata::{CatalogError, CatalogHit, CatalogSearch};
use super::rate_limiter::{RateLimitedClient, RetryConfig, StatusExt, retry_async};

pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

/// TMDB API client with rate limiting and retry logic
pub struct TmdbClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: String,
    retry_config: RetryConfig,
}

/// Search envelope shared by the movie and TV endpoints
#[derive(Debug, Deserialize)]
struct TmdbSearchResult<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

/// Movie search result from TMDB
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
}

/// TV search result from TMDB
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbTvShow {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
}

impl From<TmdbMovie> for CatalogHit {
    fn from(movie: TmdbMovie) -> Self {
        Self {
            id: movie.id,
            title: movie.title.unwrap_or_default(),
            date: movie.release_date,
            popularity: movie.popularity.unwrap_or(0.0),
        }
    }
}

impl From<TmdbTvShow> for CatalogHit {
    fn from(show: TmdbTvShow) -> Self {
        Self {
            id: show.id,
            title: show.name.unwrap_or_default(),
            date: show.first_air_date,
            popularity: show.popularity.unwrap_or(0.0),
        }
    }
}

impl TmdbClient {
    /// Create a new TMDB client against `base_url`
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Arc::new(RateLimitedClient::for_tmdb(timeout)?),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry_config: RetryConfig::default(),
        })
    }

    /// Override the retry policy
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// GET a search endpoint, retrying transient statuses
    async fn search<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(&'static str, String)>,
        operation_name: &str,
    ) -> Result<Vec<T>, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        let mut query = vec![
            ("api_key", self.api_key.clone()),
            ("include_adult", "false".to_string()),
        ];
        query.extend(params);

        retry_async(
            || {
                let url = url.as_str();
                let query = &query;
                async move {
                    let response = self.client.get_with_query(url, query).await?;

                    let status = response.status();
                    if status.is_transient() {
                        return Err(CatalogError::Transient {
                            status: status.as_u16(),
                        });
                    }
                    if !status.is_success() {
                        return Err(CatalogError::Status {
                            status: status.as_u16(),
                        });
                    }

                    let body = response.bytes().await?;
                    let parsed: TmdbSearchResult<T> = serde_json::from_slice(&body)
                        .map_err(|e| CatalogError::Decode(e.to_string()))?;

                    Ok(parsed.results)
                }
            },
            CatalogError::is_transient,
            &self.retry_config,
            operation_name,
        )
        .await
    }
}

#[async_trait]
impl CatalogSearch for TmdbClient {
    async fn search_movies(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<Vec<CatalogHit>, CatalogError> {
        info!(
            "Searching TMDB for movie '{}'{}",
            query,
            year.map(|y| format!(" ({})", y)).unwrap_or_default()
        );

        let mut params = vec![("query", query.to_string())];
        if let Some(y) = year {
            params.push(("year", y.to_string()));
        }

        let movies: Vec<TmdbMovie> = self
            .search("/search/movie", params, "tmdb_search_movies")
            .await?;

        debug!(count = movies.len(), "TMDB movie search returned results");
        Ok(movies.into_iter().map(CatalogHit::from).collect())
    }

    async fn search_tv(&self, query: &str) -> Result<Vec<CatalogHit>, CatalogError> {
        info!("Searching TMDB for TV show '{}'", query);

        let shows: Vec<TmdbTvShow> = self
            .search("/search/tv", vec![("query", query.to_string())], "tmdb_search_tv")
            .await?;

        debug!(count = shows.len(), "TMDB TV search returned results");
        Ok(shows.into_iter().map(CatalogHit::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_result_decoding() {
        let body = r#"{
            "page": 1,
            "results": [
                {"id": 42, "title": "Movie Name", "release_date": "2020-01-01", "popularity": 10.5, "adult": false},
                {"id": 43, "title": "Movie Name 2"}
            ],
            "total_pages": 1,
            "total_results": 2
        }"#;
        let parsed: TmdbSearchResult<TmdbMovie> = serde_json::from_str(body).unwrap();
        let hits: Vec<CatalogHit> = parsed.results.into_iter().map(CatalogHit::from).collect();

        assert_eq!(hits[0].id, 42);
        assert_eq!(hits[0].year(), Some(2020));
        assert_eq!(hits[0].popularity, 10.5);
        assert_eq!(hits[1].date, None);
        assert_eq!(hits[1].popularity, 0.0);
    }

    #[test]
    fn test_tv_result_decoding() {
        let body = r#"{"results": [{"id": 7, "name": "Show", "first_air_date": "", "popularity": 5}]}"#;
        let parsed: TmdbSearchResult<TmdbTvShow> = serde_json::from_str(body).unwrap();
        let hit = CatalogHit::from(parsed.results[0].clone());

        assert_eq!(hit.title, "Show");
        assert_eq!(hit.year(), None);
        assert_eq!(hit.popularity, 5.0);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = TmdbClient::new(
            "key".to_string(),
            "http://localhost:1234/3/".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:1234/3");
        assert!(client.has_api_key());
    }
}
