//! Library database repository

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{decode_err, from_json_or_default, str_to_uuid, to_json, uuid_to_str};

/// Free-form per-library settings supplied by the user
pub type LibrarySettings = HashMap<String, serde_json::Value>;

/// Library content kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    Movie,
    Tv,
}

impl LibraryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryKind::Movie => "movie",
            LibraryKind::Tv => "tv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "movie" => Some(LibraryKind::Movie),
            "tv" => Some(LibraryKind::Tv),
            _ => None,
        }
    }
}

impl fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Library record from database
#[derive(Debug, Clone)]
pub struct LibraryRecord {
    pub id: Uuid,
    pub name: String,
    pub kind: LibraryKind,
    pub disk_id: Uuid,
    pub root_subdir: String,
    pub settings: LibrarySettings,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for LibraryRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let disk_id_str: String = row.try_get("disk_id")?;
        let kind_str: String = row.try_get("kind")?;
        let settings_str: String = row.try_get("settings_json")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(decode_err)?,
            name: row.try_get("name")?,
            kind: LibraryKind::parse(&kind_str).ok_or_else(|| {
                decode_err(anyhow::anyhow!("Unknown library kind '{}'", kind_str))
            })?,
            disk_id: str_to_uuid(&disk_id_str).map_err(decode_err)?,
            root_subdir: row.try_get("root_subdir")?,
            settings: from_json_or_default(&settings_str),
        })
    }
}

impl LibraryRecord {
    /// Absolute root of the library on the given disk mount
    pub fn root_on(&self, mount_path: &str) -> PathBuf {
        Path::new(mount_path).join(&self.root_subdir)
    }
}

/// Input for creating a library
#[derive(Debug)]
pub struct CreateLibrary {
    pub name: String,
    pub kind: LibraryKind,
    pub disk_id: Uuid,
    pub root_subdir: String,
    pub settings: LibrarySettings,
}

/// Reject subdirectories that could escape the disk mount
pub fn validate_root_subdir(root_subdir: &str) -> Result<()> {
    let path = Path::new(root_subdir);
    if root_subdir.trim().is_empty() {
        bail!("root_subdir must not be empty");
    }
    if path.is_absolute() || root_subdir.starts_with('/') {
        bail!("root_subdir must be a relative directory name");
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        bail!("root_subdir must not contain '..'");
    }
    Ok(())
}

pub struct LibraryRepository {
    pool: SqlitePool,
}

impl LibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all libraries ordered by name
    pub async fn list(&self) -> Result<Vec<LibraryRecord>> {
        let records = sqlx::query_as::<_, LibraryRecord>(
            r#"
            SELECT id, name, kind, disk_id, root_subdir, settings_json
            FROM libraries
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Get a library by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<LibraryRecord>> {
        let record = sqlx::query_as::<_, LibraryRecord>(
            r#"
            SELECT id, name, kind, disk_id, root_subdir, settings_json
            FROM libraries
            WHERE id = ?
            "#,
        )
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Create a new library
    pub async fn create(&self, input: CreateLibrary) -> Result<LibraryRecord> {
        validate_root_subdir(&input.root_subdir)?;

        let record = sqlx::query_as::<_, LibraryRecord>(
            r#"
            INSERT INTO libraries (id, name, kind, disk_id, root_subdir, settings_json)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, name, kind, disk_id, root_subdir, settings_json
            "#,
        )
        .bind(uuid_to_str(Uuid::new_v4()))
        .bind(&input.name)
        .bind(input.kind.as_str())
        .bind(uuid_to_str(input.disk_id))
        .bind(&input.root_subdir)
        .bind(to_json(&input.settings))
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Delete a library
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM libraries WHERE id = ?")
            .bind(uuid_to_str(id))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
