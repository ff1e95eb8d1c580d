//! Media files database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::media_items::MediaKind;
use super::sqlite_helpers::{
    decode_err, from_json_or_default, now_iso8601, str_to_datetime, str_to_uuid, uuid_to_str,
};

/// Media file record from database
#[derive(Debug, Clone)]
pub struct MediaFileRecord {
    pub id: Uuid,
    pub item_id: Uuid,
    pub library_id: Uuid,
    pub rel_path: String,
    pub size: i64,
    pub mtime: Option<i64>,
    pub hash: Option<String>,
    pub quality: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for MediaFileRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let item_id_str: String = row.try_get("item_id")?;
        let library_id_str: String = row.try_get("library_id")?;
        let quality_str: String = row.try_get("quality_json")?;
        let created_str: String = row.try_get("created_at")?;
        let updated_str: String = row.try_get("updated_at")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(decode_err)?,
            item_id: str_to_uuid(&item_id_str).map_err(decode_err)?,
            library_id: str_to_uuid(&library_id_str).map_err(decode_err)?,
            rel_path: row.try_get("rel_path")?,
            size: row.try_get("size")?,
            mtime: row.try_get("mtime")?,
            hash: row.try_get("hash")?,
            quality: from_json_or_default(&quality_str),
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
            updated_at: str_to_datetime(&updated_str).map_err(decode_err)?,
        })
    }
}

/// Input for linking a file location to an item
#[derive(Debug, Clone)]
pub struct UpsertMediaFile {
    pub library_id: Uuid,
    pub item_id: Uuid,
    pub rel_path: String,
    pub size: i64,
    pub mtime: Option<i64>,
}

const FILE_COLUMNS: &str =
    "id, item_id, library_id, rel_path, size, mtime, hash, quality_json, created_at, updated_at";

/// Insert the file, or repoint and refresh the existing row for the same
/// (library, rel_path). Quality and hash are left untouched on update.
pub async fn upsert(conn: &mut SqliteConnection, input: &UpsertMediaFile) -> Result<MediaFileRecord> {
    let now = now_iso8601();
    let sql = format!(
        r#"
        INSERT INTO media_files (id, item_id, library_id, rel_path, size, mtime, quality_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, '{{}}', ?, ?)
        ON CONFLICT (library_id, rel_path) DO UPDATE SET
            item_id = excluded.item_id,
            size = excluded.size,
            mtime = excluded.mtime,
            updated_at = excluded.updated_at
        RETURNING {FILE_COLUMNS}
        "#
    );

    let record = sqlx::query_as::<_, MediaFileRecord>(&sql)
        .bind(uuid_to_str(Uuid::new_v4()))
        .bind(uuid_to_str(input.item_id))
        .bind(uuid_to_str(input.library_id))
        .bind(&input.rel_path)
        .bind(input.size)
        .bind(input.mtime)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *conn)
        .await?;

    Ok(record)
}

/// One browsing row: a file joined with its item and, for episodes, its series
#[derive(Debug, Clone, Serialize)]
pub struct LibraryItemRow {
    pub file_id: Uuid,
    pub rel_path: String,
    pub size: i64,
    pub mtime: Option<i64>,
    pub file_created_at: DateTime<Utc>,
    pub item_id: Uuid,
    pub kind: MediaKind,
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub series_id: Option<Uuid>,
    pub series_name: Option<String>,
    pub series_tmdb_id: Option<i64>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for LibraryItemRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let file_id: String = row.try_get("file_id")?;
        let item_id: String = row.try_get("item_id")?;
        let kind_str: String = row.try_get("kind")?;
        let series_id: Option<String> = row.try_get("series_id")?;
        let created_str: String = row.try_get("file_created_at")?;

        Ok(Self {
            file_id: str_to_uuid(&file_id).map_err(decode_err)?,
            rel_path: row.try_get("rel_path")?,
            size: row.try_get("size")?,
            mtime: row.try_get("mtime")?,
            file_created_at: str_to_datetime(&created_str).map_err(decode_err)?,
            item_id: str_to_uuid(&item_id).map_err(decode_err)?,
            kind: MediaKind::parse(&kind_str)
                .ok_or_else(|| decode_err(anyhow::anyhow!("Unknown media kind '{}'", kind_str)))?,
            tmdb_id: row.try_get("tmdb_id")?,
            title: row.try_get("title")?,
            year: row.try_get("year")?,
            season: row.try_get("season")?,
            episode: row.try_get("episode")?,
            series_id: series_id
                .as_deref()
                .map(str_to_uuid)
                .transpose()
                .map_err(decode_err)?,
            series_name: row.try_get("series_name")?,
            series_tmdb_id: row.try_get("series_tmdb_id")?,
        })
    }
}

pub struct MediaFileRepository {
    pool: SqlitePool,
}

impl MediaFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all media files for a library
    pub async fn list_by_library(&self, library_id: Uuid) -> Result<Vec<MediaFileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM media_files WHERE library_id = ? ORDER BY rel_path"
        );
        let records = sqlx::query_as::<_, MediaFileRecord>(&sql)
            .bind(uuid_to_str(library_id))
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Get a media file by its location within a library
    pub async fn get_by_path(&self, library_id: Uuid, rel_path: &str) -> Result<Option<MediaFileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM media_files WHERE library_id = ? AND rel_path = ?"
        );
        let record = sqlx::query_as::<_, MediaFileRecord>(&sql)
            .bind(uuid_to_str(library_id))
            .bind(rel_path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Total number of file rows
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Browse a library's matched files, most recently created first
    pub async fn list_items(
        &self,
        library_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LibraryItemRow>> {
        let rows = sqlx::query_as::<_, LibraryItemRow>(
            r#"
            SELECT mf.id AS file_id, mf.rel_path, mf.size, mf.mtime,
                   mf.created_at AS file_created_at,
                   mi.id AS item_id, mi.kind, mi.tmdb_id, mi.title, mi.year,
                   mi.season, mi.episode,
                   s.id AS series_id, s.name AS series_name, s.tmdb_id AS series_tmdb_id
            FROM media_files mf
            JOIN media_items mi ON mi.id = mf.item_id
            LEFT JOIN series s ON s.id = mi.series_id
            WHERE mf.library_id = ?
            ORDER BY mf.created_at DESC, mf.rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(uuid_to_str(library_id))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
