//! Snapshot persistence in the document-style store.
//!
//! Each snapshot is the full recipe content serialized as JSON, addressed by
//! the id of the commit that produced it.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::timestamp_column;
use crate::errors::AppError;
use crate::models::{format_timestamp, Snapshot};

/// Snapshot table access.
#[derive(Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a snapshot unless one with the same id already exists.
    ///
    /// Returns `true` when a new row was written.
    pub async fn insert_if_absent(&self, snapshot: &Snapshot) -> Result<bool, AppError> {
        let details = serde_json::to_string(&snapshot.details)?;

        let result = sqlx::query(
            "INSERT INTO recipe_snapshots (id, recipe_id, details, created_at) VALUES (?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(&snapshot.id)
        .bind(snapshot.recipe_id)
        .bind(&details)
        .bind(format_timestamp(&snapshot.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a snapshot by commit ID.
    pub async fn get(&self, id: &str) -> Result<Option<Snapshot>, AppError> {
        let row = sqlx::query(
            "SELECT id, recipe_id, details, created_at FROM recipe_snapshots WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    /// IDs of snapshots written at or before `cutoff`.
    pub async fn list_ids_created_before(
        &self,
        cutoff: &DateTime<Utc>,
    ) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT id FROM recipe_snapshots WHERE created_at <= ? ORDER BY created_at")
            .bind(format_timestamp(cutoff))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    /// IDs of all stored snapshots.
    pub async fn list_ids(&self) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT id FROM recipe_snapshots")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    /// Delete a snapshot.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM recipe_snapshots WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Snapshot {} not found", id)));
        }
        Ok(())
    }
}

fn snapshot_from_row(row: &SqliteRow) -> Result<Snapshot, AppError> {
    let id: String = row.get("id");
    let raw: String = row.get("details");
    let details = serde_json::from_str(&raw).map_err(|e| {
        tracing::error!("Stored snapshot {} is unreadable: {}", id, e);
        AppError::Internal(format!("Snapshot {} is unreadable", id))
    })?;
    Ok(Snapshot {
        id,
        recipe_id: row.get("recipe_id"),
        details,
        created_at: timestamp_column(row, "created_at")?,
    })
}
