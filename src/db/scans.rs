//! Library scan records
//!
//! One row per scan invocation. The row is created `running`, its statistics
//! are rewritten at every periodic flush, and it is finalized exactly once to
//! `succeeded` or `failed`. Rows are never deleted by the scanner.

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::sqlite_helpers::{
    datetime_to_str, decode_err, from_json_or_default, str_to_datetime, str_to_datetime_opt,
    str_to_uuid, to_json, uuid_to_str,
};

/// Scan lifecycle: `queued → running → {succeeded, failed}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Queued => "queued",
            ScanStatus::Running => "running",
            ScanStatus::Succeeded => "succeeded",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(ScanStatus::Queued),
            "running" => Some(ScanStatus::Running),
            "succeeded" => Some(ScanStatus::Succeeded),
            "failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Succeeded | ScanStatus::Failed)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running and final counters of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatistics {
    /// Video files seen by the walk
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub movies: u64,
    #[serde(default)]
    pub episodes: u64,
    /// movies + episodes
    #[serde(default)]
    pub matched: u64,
    /// No title, no catalog match, a failed catalog lookup, or an episode
    /// without season/episode numbers
    #[serde(default)]
    pub skipped: u64,
    /// Files whose database writes failed and were rolled back
    #[serde(default)]
    pub errors: u64,
    /// Fatal error message, only on failed scans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Library scan record from database
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub library_id: Uuid,
    pub status: ScanStatus,
    pub stats: ScanStatistics,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for ScanRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let library_id_str: String = row.try_get("library_id")?;
        let status_str: String = row.try_get("status")?;
        let stats_str: String = row.try_get("stats_json")?;
        let started_str: String = row.try_get("started_at")?;
        let finished_str: Option<String> = row.try_get("finished_at")?;

        Ok(Self {
            id: str_to_uuid(&id_str).map_err(decode_err)?,
            library_id: str_to_uuid(&library_id_str).map_err(decode_err)?,
            status: ScanStatus::parse(&status_str)
                .ok_or_else(|| decode_err(anyhow::anyhow!("Unknown scan status '{}'", status_str)))?,
            stats: from_json_or_default(&stats_str),
            started_at: str_to_datetime(&started_str).map_err(decode_err)?,
            finished_at: str_to_datetime_opt(finished_str.as_deref()).map_err(decode_err)?,
        })
    }
}

const SCAN_COLUMNS: &str = "id, library_id, status, stats_json, started_at, finished_at";

pub struct ScanRepository {
    pool: SqlitePool,
}

impl ScanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new scan record in `running` state
    pub async fn create_running(&self, library_id: Uuid) -> Result<ScanRecord> {
        let sql = format!(
            r#"
            INSERT INTO library_scans (id, library_id, status, stats_json, started_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {SCAN_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, ScanRecord>(&sql)
            .bind(uuid_to_str(Uuid::new_v4()))
            .bind(uuid_to_str(library_id))
            .bind(ScanStatus::Running.as_str())
            .bind(to_json(&ScanStatistics::default()))
            .bind(datetime_to_str(Utc::now()))
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    /// Move a scan to a terminal state with its final statistics
    pub async fn finish(
        &self,
        scan_id: Uuid,
        status: ScanStatus,
        stats: &ScanStatistics,
    ) -> Result<()> {
        debug_assert!(status.is_terminal());
        sqlx::query(
            r#"
            UPDATE library_scans
            SET status = ?, stats_json = ?, finished_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(to_json(stats))
        .bind(datetime_to_str(Utc::now()))
        .bind(uuid_to_str(scan_id))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrite the running statistics of a scan
    pub async fn update_stats(&self, scan_id: Uuid, stats: &ScanStatistics) -> Result<()> {
        sqlx::query("UPDATE library_scans SET stats_json = ? WHERE id = ?")
            .bind(to_json(stats))
            .bind(uuid_to_str(scan_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fail every scan of a library still marked `running`, keeping its
    /// counters and recording `error`. Returns the number of records closed.
    pub async fn fail_running(&self, library_id: Uuid, error: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE library_scans
            SET status = ?, stats_json = json_set(stats_json, '$.error', ?), finished_at = ?
            WHERE library_id = ? AND status = ?
            "#,
        )
        .bind(ScanStatus::Failed.as_str())
        .bind(error)
        .bind(datetime_to_str(Utc::now()))
        .bind(uuid_to_str(library_id))
        .bind(ScanStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Most recent scans of a library first
    pub async fn list_by_library(&self, library_id: Uuid, limit: i64) -> Result<Vec<ScanRecord>> {
        let sql = format!(
            r#"
            SELECT {SCAN_COLUMNS}
            FROM library_scans
            WHERE library_id = ?
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?
            "#
        );
        let records = sqlx::query_as::<_, ScanRecord>(&sql)
            .bind(uuid_to_str(library_id))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ScanStatus::Queued,
            ScanStatus::Running,
            ScanStatus::Succeeded,
            ScanStatus::Failed,
        ] {
            assert_eq!(ScanStatus::parse(status.as_str()), Some(status));
        }
        assert!(ScanStatus::Failed.is_terminal());
        assert!(!ScanStatus::Running.is_terminal());
    }

    #[test]
    fn test_statistics_json_shape() {
        let stats = ScanStatistics {
            files: 2,
            movies: 1,
            episodes: 1,
            matched: 2,
            ..Default::default()
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "files": 2, "movies": 1, "episodes": 1,
                "matched": 2, "skipped": 0, "errors": 0
            })
        );
    }

    async fn test_db() -> (tempfile::TempDir, crate::db::Database) {
        let dir = tempfile::TempDir::new().unwrap();
        let db = crate::db::Database::connect(dir.path().join("scans.db").to_str().unwrap())
            .await
            .unwrap();
        db.migrate().await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_fail_running_closes_only_running_scans() {
        let (_dir, db) = test_db().await;
        let library_id = Uuid::new_v4();
        let repo = db.scans();

        let done = repo.create_running(library_id).await.unwrap();
        repo.finish(done.id, ScanStatus::Succeeded, &ScanStatistics::default())
            .await
            .unwrap();

        let stuck = repo.create_running(library_id).await.unwrap();
        let progress = ScanStatistics {
            files: 3,
            skipped: 3,
            ..Default::default()
        };
        repo.update_stats(stuck.id, &progress).await.unwrap();

        assert_eq!(repo.fail_running(library_id, "scan task panicked").await.unwrap(), 1);

        let scans = repo.list_by_library(library_id, 10).await.unwrap();
        let stuck = scans.iter().find(|s| s.id == stuck.id).unwrap();
        assert_eq!(stuck.status, ScanStatus::Failed);
        assert!(stuck.finished_at.is_some());
        assert_eq!(stuck.stats.files, 3);
        assert_eq!(stuck.stats.error.as_deref(), Some("scan task panicked"));

        let done = scans.iter().find(|s| s.id == done.id).unwrap();
        assert_eq!(done.status, ScanStatus::Succeeded);
        assert_eq!(done.stats.error, None);
    }

    #[test]
    fn test_statistics_tolerate_partial_blobs() {
        let stats: ScanStatistics =
            serde_json::from_str(r#"{"files": 3, "error": "disk not found"}"#).unwrap();
        assert_eq!(stats.files, 3);
        assert_eq!(stats.matched, 0);
        assert_eq!(stats.error.as_deref(), Some("disk not found"));
    }
}
