//! Branch persistence: branch rows plus their commit membership.

use std::collections::{BTreeSet, HashMap};

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::timestamp_column;
use crate::errors::AppError;
use crate::models::{format_timestamp, Branch};

const BRANCH_COLUMNS: &str =
    "id, name, recipe_id, head_commit_id, version, created_at, updated_at";

/// Branch table access.
#[derive(Clone)]
pub struct BranchStore {
    pool: SqlitePool,
}

impl BranchStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a branch and its full membership set as part of the caller's transaction.
    pub async fn insert(&self, conn: &mut SqliteConnection, branch: &Branch) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO branches (id, name, recipe_id, head_commit_id, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(branch.recipe_id)
        .bind(&branch.head_commit_id)
        .bind(branch.version)
        .bind(format_timestamp(&branch.created_at))
        .bind(format_timestamp(&branch.updated_at))
        .execute(&mut *conn)
        .await?;

        for commit_id in &branch.commits {
            sqlx::query("INSERT INTO branch_commits (branch_id, commit_id) VALUES (?, ?)")
                .bind(&branch.id)
                .bind(commit_id)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Persist a head move made with [`Branch::advance`].
    ///
    /// The row is only updated while it still carries `expected_version`;
    /// returns `false` when another writer moved the head first.
    pub async fn update_head(
        &self,
        conn: &mut SqliteConnection,
        branch: &Branch,
        expected_version: i64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE branches SET head_commit_id = ?, version = ?, updated_at = ? WHERE id = ? AND version = ?",
        )
        .bind(&branch.head_commit_id)
        .bind(branch.version)
        .bind(format_timestamp(&branch.updated_at))
        .bind(&branch.id)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("INSERT OR IGNORE INTO branch_commits (branch_id, commit_id) VALUES (?, ?)")
            .bind(&branch.id)
            .bind(&branch.head_commit_id)
            .execute(&mut *conn)
            .await?;

        Ok(true)
    }

    /// Get a branch by ID, including its membership set.
    ///
    /// Row and membership are read in one transaction so both come from the
    /// same snapshot even while a commit is moving the head.
    pub async fn get(&self, id: &str) -> Result<Option<Branch>, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {} FROM branches WHERE id = ?", BRANCH_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let commits = sqlx::query("SELECT commit_id FROM branch_commits WHERE branch_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|r| r.get("commit_id"))
            .collect();
        tx.commit().await?;

        branch_from_row(&row, commits).map(Some)
    }

    /// Version currently stored for a branch, read on the caller's connection.
    pub async fn current_version(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> Result<Option<i64>, AppError> {
        let row = sqlx::query("SELECT version FROM branches WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|r| r.get("version")))
    }

    /// Whether the recipe already has a branch with this name.
    pub async fn name_exists(&self, recipe_id: i64, name: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM branches WHERE recipe_id = ? AND name = ?")
            .bind(recipe_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// All branches of a recipe. No particular order is promised.
    pub async fn list_by_recipe(&self, recipe_id: i64) -> Result<Vec<Branch>, AppError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM branches WHERE recipe_id = ?",
            BRANCH_COLUMNS
        ))
        .bind(recipe_id)
        .fetch_all(&mut *tx)
        .await?;

        let membership = sqlx::query(
            r#"SELECT bc.branch_id, bc.commit_id
               FROM branch_commits bc
               JOIN branches b ON b.id = bc.branch_id
               WHERE b.recipe_id = ?"#,
        )
        .bind(recipe_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut commits_by_branch: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in &membership {
            commits_by_branch
                .entry(row.get("branch_id"))
                .or_default()
                .insert(row.get("commit_id"));
        }

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let commits = commits_by_branch.remove(&id).unwrap_or_default();
                branch_from_row(row, commits)
            })
            .collect()
    }
}

fn branch_from_row(row: &SqliteRow, commits: BTreeSet<String>) -> Result<Branch, AppError> {
    Ok(Branch {
        id: row.get("id"),
        name: row.get("name"),
        recipe_id: row.get("recipe_id"),
        head_commit_id: row.get("head_commit_id"),
        commits,
        version: row.get("version"),
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}
