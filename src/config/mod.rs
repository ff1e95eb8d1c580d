//! Application configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::services::metadata::MetadataConfig;
use crate::services::scanner::ScannerConfig;
use crate::services::tmdb::DEFAULT_TMDB_BASE_URL;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// SQLite file path, or a `sqlite:` URL
    pub database_url: String,

    /// TMDB API key; matching is disabled without one
    pub tmdb_api_key: Option<String>,

    /// TMDB API base URL
    pub tmdb_base_url: String,

    /// Per-request timeout for catalog lookups
    pub tmdb_timeout: Duration,

    /// Files processed between scan progress flushes
    pub scan_flush_every: usize,

    /// Scan every library once at startup
    pub scan_on_startup: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/library.db".to_string());

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url,

            tmdb_api_key: env::var("TMDB_API_KEY").ok().filter(|k| !k.trim().is_empty()),

            tmdb_base_url: env::var("TMDB_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_TMDB_BASE_URL.to_string()),

            tmdb_timeout: Duration::from_secs(
                env::var("TMDB_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("Invalid TMDB_TIMEOUT_SECS")?,
            ),

            scan_flush_every: env::var("SCAN_FLUSH_EVERY")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),

            scan_on_startup: env::var("SCAN_ON_STARTUP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Resolver settings derived from this configuration
    pub fn metadata(&self) -> MetadataConfig {
        MetadataConfig {
            tmdb_api_key: self.tmdb_api_key.clone(),
            base_url: self.tmdb_base_url.clone(),
            timeout: self.tmdb_timeout,
        }
    }

    /// Scanner settings derived from this configuration
    pub fn scanner(&self) -> ScannerConfig {
        ScannerConfig {
            flush_every: self.scan_flush_every.max(1),
        }
    }
}
