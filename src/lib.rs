//! Media library scanner
//!
//! Walks library directories, parses release-style filenames, matches them
//! against TMDB and keeps a normalized series → item → file graph in SQLite.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod services;

pub use app::{AppState, build_app};
