//! Branch service.
//!
//! Owns the branch invariants: one `main` per recipe, unique names per
//! recipe, the head always being a member of the branch, and forks copying
//! membership by value.

use sqlx::sqlite::SqliteConnection;

use crate::db::{BranchStore, CommitStore};
use crate::errors::AppError;
use crate::models::{Branch, Commit, MAIN_BRANCH_NAME};

#[derive(Clone)]
pub struct BranchService {
    store: BranchStore,
    commits: CommitStore,
}

impl BranchService {
    pub fn new(store: BranchStore, commits: CommitStore) -> Self {
        Self { store, commits }
    }

    /// Fail if the recipe already has a `main` branch.
    pub async fn ensure_not_initialized(&self, recipe_id: i64) -> Result<(), AppError> {
        if self.store.name_exists(recipe_id, MAIN_BRANCH_NAME).await? {
            return Err(already_initialized(recipe_id));
        }
        Ok(())
    }

    /// Fail if any branch of the recipe already uses `name`.
    pub async fn ensure_unique_name(&self, recipe_id: i64, name: &str) -> Result<(), AppError> {
        if self.store.name_exists(recipe_id, name).await? {
            return Err(name_taken(recipe_id, name));
        }
        Ok(())
    }

    pub async fn create_main_branch(
        &self,
        conn: &mut SqliteConnection,
        recipe_id: i64,
        commit: &Commit,
    ) -> Result<Branch, AppError> {
        let branch = self
            .create_branch(conn, recipe_id, MAIN_BRANCH_NAME, commit)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => already_initialized(recipe_id),
                other => other,
            })?;
        tracing::info!("Created main branch {} for recipe {}", branch.id, recipe_id);
        Ok(branch)
    }

    /// Create a branch whose only commit is `commit`.
    pub async fn create_branch(
        &self,
        conn: &mut SqliteConnection,
        recipe_id: i64,
        name: &str,
        commit: &Commit,
    ) -> Result<Branch, AppError> {
        let branch = Branch::new(recipe_id, name, commit);
        self.store.insert(conn, &branch).await.map_err(|e| match e {
            AppError::Conflict(_) => name_taken(recipe_id, name),
            other => other,
        })?;
        Ok(branch)
    }

    /// Persist a copy of `source` under a new name and recipe.
    pub async fn fork(
        &self,
        conn: &mut SqliteConnection,
        source: &Branch,
        name: &str,
        recipe_id: i64,
    ) -> Result<Branch, AppError> {
        let branch = source.fork(name, recipe_id);
        self.store.insert(conn, &branch).await.map_err(|e| match e {
            AppError::Conflict(_) => name_taken(recipe_id, name),
            other => other,
        })?;
        tracing::info!(
            "Forked branch {} into {} ({} commits, recipe {})",
            source.id,
            branch.id,
            branch.commits.len(),
            recipe_id
        );
        Ok(branch)
    }

    /// Move the branch head to `commit`.
    ///
    /// Fails with `VersionMismatch` if the stored branch moved since `branch`
    /// was loaded; the caller's transaction must then be rolled back.
    pub async fn add_commit(
        &self,
        conn: &mut SqliteConnection,
        branch: &Branch,
        commit: &Commit,
    ) -> Result<Branch, AppError> {
        let mut updated = branch.clone();
        updated.advance(commit);

        if !self.store.update_head(&mut *conn, &updated, branch.version).await? {
            let current_version = self
                .store
                .current_version(conn, &branch.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Branch {} not found", branch.id)))?;
            return Err(AppError::VersionMismatch {
                message: format!(
                    "Branch {} was modified concurrently (expected version {}, found {})",
                    branch.id, branch.version, current_version
                ),
                current_version,
            });
        }

        tracing::debug!(
            "Branch {} head moved to {} (version {})",
            updated.id,
            updated.head_commit_id,
            updated.version
        );
        Ok(updated)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Branch, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Branch {} not found", id)))
    }

    /// Commits of the branch, most recent first.
    pub async fn get_history(&self, branch_id: &str) -> Result<Vec<Commit>, AppError> {
        let branch = self.get_by_id(branch_id).await?;
        let history = self.commits.list_for_branch(&branch.id).await?;
        tracing::debug!(
            "Loaded {} commits of branch {}",
            history.len(),
            branch.id
        );
        Ok(history)
    }

    pub async fn list_by_recipe(&self, recipe_id: i64) -> Result<Vec<Branch>, AppError> {
        self.store.list_by_recipe(recipe_id).await
    }
}

fn already_initialized(recipe_id: i64) -> AppError {
    AppError::Conflict(format!("Recipe {} is already initialized", recipe_id))
}

fn name_taken(recipe_id: i64, name: &str) -> AppError {
    AppError::Conflict(format!(
        "Branch name {:?} is not unique for recipe {}",
        name, recipe_id
    ))
}
