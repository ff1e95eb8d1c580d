//! Series database repository
//!
//! A series row exists only for TV content and is created lazily the first
//! time one of its episodes is matched.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::sqlite_helpers::{decode_err, now_iso8601, str_to_datetime, str_to_uuid, uuid_to_str};

/// Series record from database
#[derive(Debug, Clone)]
pub struct SeriesRecord {
    pub id: Uuid,
    pub tmdb_id: i64,
    pub name: String,
    pub year: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for SeriesRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let created_str: String = row.try_get("created_at")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(decode_err)?,
            tmdb_id: row.try_get("tmdb_id")?,
            name: row.try_get("name")?,
            year: row.try_get("year")?,
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
        })
    }
}

/// Input for creating a series
#[derive(Debug, Clone)]
pub struct CreateSeries {
    pub tmdb_id: i64,
    pub name: String,
    pub year: Option<i32>,
}

/// Find a series by catalog id, creating it if absent.
///
/// Returns the record and whether this call created it.
pub async fn find_or_create(
    conn: &mut SqliteConnection,
    input: &CreateSeries,
) -> Result<(SeriesRecord, bool)> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO series (id, tmdb_id, name, year, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (tmdb_id) DO NOTHING
        "#,
    )
    .bind(uuid_to_str(Uuid::new_v4()))
    .bind(input.tmdb_id)
    .bind(&input.name)
    .bind(input.year)
    .bind(now_iso8601())
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    let record = sqlx::query_as::<_, SeriesRecord>(
        "SELECT id, tmdb_id, name, year, created_at FROM series WHERE tmdb_id = ?",
    )
    .bind(input.tmdb_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok((record, inserted))
}

pub struct SeriesRepository {
    pool: SqlitePool,
}

impl SeriesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a series by its catalog id
    pub async fn get_by_tmdb_id(&self, tmdb_id: i64) -> Result<Option<SeriesRecord>> {
        let record = sqlx::query_as::<_, SeriesRecord>(
            "SELECT id, tmdb_id, name, year, created_at FROM series WHERE tmdb_id = ?",
        )
        .bind(tmdb_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Total number of series rows
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM series")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
