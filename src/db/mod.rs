//! Database module for SQLite persistence.
//!
//! Two independent databases back the service: a relational metadata store
//! (commits, branches, branch membership) and a document-style snapshot store
//! holding recipe content keyed by commit id. They share no transaction.

mod branches;
mod commits;
mod snapshots;

pub use branches::*;
pub use commits::*;
pub use snapshots::*;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::errors::AppError;
use crate::models::parse_timestamp;

/// Open (creating if needed) the metadata database and run its migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let pool = connect(db_path).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Open (creating if needed) the snapshot database and run its migrations.
pub async fn init_snapshot_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let pool = connect(db_path).await?;
    run_snapshot_migrations(&pool).await?;
    Ok(pool)
}

async fn connect(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Run metadata migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commits (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            author_id TEXT NOT NULL,
            message TEXT NOT NULL,
            parent_id TEXT REFERENCES commits(id),
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS branches (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            recipe_id INTEGER NOT NULL,
            head_commit_id TEXT NOT NULL REFERENCES commits(id),
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (recipe_id, name)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS branch_commits (
            branch_id TEXT NOT NULL REFERENCES branches(id),
            commit_id TEXT NOT NULL REFERENCES commits(id),
            PRIMARY KEY (branch_id, commit_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_branches_recipe_id ON branches(recipe_id);
        CREATE INDEX IF NOT EXISTS idx_commits_created_at ON commits(created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Run snapshot store migrations.
async fn run_snapshot_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipe_snapshots (
            id TEXT PRIMARY KEY,
            recipe_id INTEGER NOT NULL,
            details TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_snapshots_created_at ON recipe_snapshots(created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Read a timestamp column written with `format_timestamp`.
fn timestamp_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, AppError> {
    let raw: String = row.try_get(column)?;
    parse_timestamp(&raw)
        .map_err(|e| AppError::Database(format!("Invalid timestamp {:?} in {}: {}", raw, column, e)))
}
