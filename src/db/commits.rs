//! Commit persistence. Commits are append-only: no update or delete.

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::timestamp_column;
use crate::errors::AppError;
use crate::models::{format_timestamp, Commit};

/// Commit table access.
#[derive(Clone)]
pub struct CommitStore {
    pool: SqlitePool,
}

impl CommitStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a commit as part of the caller's transaction.
    pub async fn insert(&self, conn: &mut SqliteConnection, commit: &Commit) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO commits (id, author_id, message, parent_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&commit.id)
        .bind(&commit.author_id)
        .bind(&commit.message)
        .bind(&commit.parent_id)
        .bind(format_timestamp(&commit.created_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Get a commit by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Commit>, AppError> {
        let row = sqlx::query(
            "SELECT id, author_id, message, parent_id, created_at FROM commits WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(commit_from_row).transpose()
    }

    /// Every commit that belongs to a branch, newest first.
    ///
    /// Equal timestamps fall back to insertion order, newest first.
    pub async fn list_for_branch(&self, branch_id: &str) -> Result<Vec<Commit>, AppError> {
        let rows = sqlx::query(
            r#"SELECT c.id, c.author_id, c.message, c.parent_id, c.created_at
               FROM branch_commits bc
               JOIN commits c ON c.id = bc.commit_id
               WHERE bc.branch_id = ?
               ORDER BY c.created_at DESC, c.seq DESC"#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(commit_from_row).collect()
    }

    /// IDs of all commits ever written.
    pub async fn list_ids(&self) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT id FROM commits ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}

fn commit_from_row(row: &SqliteRow) -> Result<Commit, AppError> {
    Ok(Commit {
        id: row.get("id"),
        author_id: row.get("author_id"),
        message: row.get("message"),
        parent_id: row.get("parent_id"),
        created_at: timestamp_column(row, "created_at")?,
    })
}
