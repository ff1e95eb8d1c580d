//! Disk database repository

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{decode_err, str_to_uuid, uuid_to_str};

/// Disk record from database
#[derive(Debug, Clone)]
pub struct DiskRecord {
    pub id: Uuid,
    pub name: String,
    pub mount_path: String,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for DiskRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        Ok(Self {
            id: str_to_uuid(&id_str).map_err(decode_err)?,
            name: row.try_get("name")?,
            mount_path: row.try_get("mount_path")?,
        })
    }
}

/// Input for creating a disk
#[derive(Debug)]
pub struct CreateDisk {
    pub name: String,
    pub mount_path: String,
}

pub struct DiskRepository {
    pool: SqlitePool,
}

impl DiskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a disk by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<DiskRecord>> {
        let record = sqlx::query_as::<_, DiskRecord>(
            "SELECT id, name, mount_path FROM disks WHERE id = ?",
        )
        .bind(uuid_to_str(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Create a new disk
    pub async fn create(&self, input: CreateDisk) -> Result<DiskRecord> {
        let record = sqlx::query_as::<_, DiskRecord>(
            r#"
            INSERT INTO disks (id, name, mount_path)
            VALUES (?, ?, ?)
            RETURNING id, name, mount_path
            "#,
        )
        .bind(uuid_to_str(Uuid::new_v4()))
        .bind(&input.name)
        .bind(&input.mount_path)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Delete a disk
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM disks WHERE id = ?")
            .bind(uuid_to_str(id))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
