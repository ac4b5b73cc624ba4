//! Commit service: creates commits chained to a parent and resolves them by id.

use sqlx::sqlite::SqliteConnection;

use crate::db::CommitStore;
use crate::errors::AppError;
use crate::models::{Commit, INITIAL_COMMIT_MESSAGE};

#[derive(Clone)]
pub struct CommitService {
    store: CommitStore,
}

impl CommitService {
    pub fn new(store: CommitStore) -> Self {
        Self { store }
    }

    /// Create the root commit of a lineage.
    pub async fn create_initial_commit(
        &self,
        conn: &mut SqliteConnection,
        id: String,
        author_id: &str,
    ) -> Result<Commit, AppError> {
        self.create_commit(conn, id, author_id, INITIAL_COMMIT_MESSAGE, None)
            .await
    }

    /// Create a commit whose parent is `parent`; `None` makes a root commit.
    pub async fn create_commit(
        &self,
        conn: &mut SqliteConnection,
        id: String,
        author_id: &str,
        message: &str,
        parent: Option<&Commit>,
    ) -> Result<Commit, AppError> {
        let commit = Commit::new(id, author_id, message, parent);
        self.store.insert(conn, &commit).await?;
        tracing::debug!(
            "Created commit {} with parent {:?}",
            commit.id,
            commit.parent_id
        );
        Ok(commit)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Commit, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Commit {} not found", id)))
    }

    pub async fn list_ids(&self) -> Result<Vec<String>, AppError> {
        self.store.list_ids().await
    }
}
