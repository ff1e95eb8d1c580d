//! Entity reconciliation
//!
//! Persists a resolved identity into the entity graph:
//! series (TV only) → media item → media file. Every step is a
//! find-or-create on the table's identity key, so reconciling the same file
//! twice converges on the same rows. Callers run this inside a transaction
//! (the scanner opens one transaction per file) so a file never half-applies.

use anyhow::{Result, bail};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use super::filename_parser::Guess;
use super::metadata::Candidate;
use crate::db::{CreateMediaItem, CreateSeries, MediaKind, UpsertMediaFile, media_files, media_items, series};

/// Location and stat of one file under a library root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Path relative to the library root, `/`-separated
    pub rel_path: String,
    pub size: i64,
    /// Unix seconds
    pub mtime: Option<i64>,
}

/// Link `file` to the identity described by `candidate` and `guess`,
/// returning the media file id
pub async fn reconcile(
    conn: &mut SqliteConnection,
    library_id: Uuid,
    candidate: &Candidate,
    guess: &Guess,
    file: &FileStat,
) -> Result<Uuid> {
    let title = if candidate.title.trim().is_empty() {
        guess.title.clone().unwrap_or_default()
    } else {
        candidate.title.clone()
    };
    let year = candidate.year.or(guess.year);

    let item_input = match guess.kind {
        MediaKind::Movie => CreateMediaItem {
            kind: MediaKind::Movie,
            tmdb_id: candidate.tmdb_id,
            title,
            year,
            series_id: None,
            season: None,
            episode: None,
        },
        MediaKind::Episode => {
            let (Some(season), Some(episode)) = (guess.season, guess.episode) else {
                bail!("episode guess for {} has no season/episode", file.rel_path);
            };

            let (series, created) = series::find_or_create(
                conn,
                &CreateSeries {
                    tmdb_id: candidate.tmdb_id,
                    name: title,
                    year,
                },
            )
            .await?;
            if created {
                debug!(tmdb_id = series.tmdb_id, name = %series.name, "Created series");
            }

            // Episodes carry the series identity; season/episode disambiguate
            CreateMediaItem {
                kind: MediaKind::Episode,
                tmdb_id: series.tmdb_id,
                title: series.name,
                year: series.year,
                series_id: Some(series.id),
                season: Some(season),
                episode: Some(episode),
            }
        }
    };

    let (item, created) = media_items::find_or_create(conn, &item_input).await?;
    if created {
        debug!(
            kind = %item.kind,
            tmdb_id = item.tmdb_id,
            title = %item.title,
            "Created media item"
        );
    }

    let record = media_files::upsert(
        conn,
        &UpsertMediaFile {
            library_id,
            item_id: item.id,
            rel_path: file.rel_path.clone(),
            size: file.size,
            mtime: file.mtime,
        },
    )
    .await?;

    Ok(record.id)
}
