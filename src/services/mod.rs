//! Scanning, matching and catalog services

pub mod filename_parser;
pub mod metadata;
pub mod rate_limiter;
pub mod reconciler;
pub mod scanner;
pub mod tmdb;

pub use filename_parser::Guess;
pub use metadata::{
    Candidate, CatalogError, CatalogHit, CatalogSearch, MatchScorer, MetadataConfig,
    MetadataResolver, PopularityYearScorer, SearchHit, SearchMediaType, year_proximity,
};
pub use reconciler::FileStat;
pub use scanner::{ScanError, ScanTrigger, ScannerConfig, ScannerService, create_scanner_service};
pub use tmdb::TmdbClient;
