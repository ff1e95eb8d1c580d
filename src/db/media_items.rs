//! Media items database repository
//!
//! An item is the catalog identity of a movie or of a single episode. The
//! identity key is (kind, tmdb_id, series_id, season, episode) with NULLs
//! treated as equal, so one title can exist as a movie and as distinct
//! episodes without colliding.

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::sqlite_helpers::{
    decode_err, now_iso8601, str_to_datetime, str_to_uuid, str_to_uuid_opt, uuid_to_str,
};

/// Kind of catalog identity an item represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Episode => "episode",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "movie" => Some(MediaKind::Movie),
            "episode" => Some(MediaKind::Episode),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media item record from database
#[derive(Debug, Clone)]
pub struct MediaItemRecord {
    pub id: Uuid,
    pub kind: MediaKind,
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub series_id: Option<Uuid>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for MediaItemRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let kind_str: String = row.try_get("kind")?;
        let series_id_str: Option<String> = row.try_get("series_id")?;
        let created_str: String = row.try_get("created_at")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(decode_err)?,
            kind: MediaKind::parse(&kind_str)
                .ok_or_else(|| decode_err(anyhow::anyhow!("Unknown media kind '{}'", kind_str)))?,
            tmdb_id: row.try_get("tmdb_id")?,
            title: row.try_get("title")?,
            year: row.try_get("year")?,
            series_id: str_to_uuid_opt(series_id_str.as_deref()).map_err(decode_err)?,
            season: row.try_get("season")?,
            episode: row.try_get("episode")?,
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
        })
    }
}

/// Input for creating a media item; also the lookup key
#[derive(Debug, Clone)]
pub struct CreateMediaItem {
    pub kind: MediaKind,
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub series_id: Option<Uuid>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
}

/// Find an item by its identity key, creating it if absent.
///
/// Returns the record and whether this call created it.
pub async fn find_or_create(
    conn: &mut SqliteConnection,
    input: &CreateMediaItem,
) -> Result<(MediaItemRecord, bool)> {
    let series_id = input.series_id.map(uuid_to_str);

    let inserted = sqlx::query(
        r#"
        INSERT INTO media_items (id, kind, tmdb_id, title, year, series_id, season, episode, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(uuid_to_str(Uuid::new_v4()))
    .bind(input.kind.as_str())
    .bind(input.tmdb_id)
    .bind(&input.title)
    .bind(input.year)
    .bind(&series_id)
    .bind(input.season)
    .bind(input.episode)
    .bind(now_iso8601())
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    let record = sqlx::query_as::<_, MediaItemRecord>(
        r#"
        SELECT id, kind, tmdb_id, title, year, series_id, season, episode, created_at
        FROM media_items
        WHERE kind = ?
          AND tmdb_id = ?
          AND series_id IS ?
          AND season IS ?
          AND episode IS ?
        "#,
    )
    .bind(input.kind.as_str())
    .bind(input.tmdb_id)
    .bind(&series_id)
    .bind(input.season)
    .bind(input.episode)
    .fetch_one(&mut *conn)
    .await?;

    Ok((record, inserted))
}

pub struct MediaItemRepository {
    pool: SqlitePool,
}

impl MediaItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get an item by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<MediaItemRecord>> {
        let record = sqlx::query_as::<_, MediaItemRecord>(
            r#"
            SELECT id, kind, tmdb_id, title, year, series_id, season, episode, created_at
            FROM media_items
            WHERE id = ?
            "#,
        )
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// List all items of one kind, oldest first
    pub async fn list_by_kind(&self, kind: MediaKind) -> Result<Vec<MediaItemRecord>> {
        let records = sqlx::query_as::<_, MediaItemRecord>(
            r#"
            SELECT id, kind, tmdb_id, title, year, series_id, season, episode, created_at
            FROM media_items
            WHERE kind = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Total number of item rows
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
