//! Version control orchestrator.
//!
//! Every operation is a single request-scoped sequence of store calls; no state
//! is held between requests. Content is written to the snapshot store first,
//! then commit row, branch head and membership are written in one metadata
//! transaction. A crash between the two leaves only an unreferenced snapshot,
//! which [`VersionControl::reconcile`] removes.

use std::collections::HashSet;
use std::time::Duration;

use sqlx::SqlitePool;

use super::{BranchService, CommitService, SnapshotService};
use crate::db::{BranchStore, CommitStore, SnapshotStore};
use crate::diff::diff_serialized;
use crate::errors::AppError;
use crate::models::{
    new_id, now, BranchDto, ChangeResponse, CommitDetailsResponse, CommitDto, RecipeDetails,
    MAIN_BRANCH_NAME,
};

/// Outcome of a reconciliation pass between the two stores.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    /// Snapshots deleted because no commit references them.
    pub removed_snapshots: Vec<String>,
    /// Commits whose snapshot is missing.
    pub commits_missing_snapshot: Vec<String>,
}

pub struct VersionControl {
    metadata: SqlitePool,
    commits: CommitService,
    branches: BranchService,
    snapshots: SnapshotService,
    commit_retries: u32,
}

impl VersionControl {
    pub fn new(metadata: SqlitePool, snapshots: SqlitePool, commit_retries: u32) -> Self {
        let commit_store = CommitStore::new(metadata.clone());
        Self {
            commits: CommitService::new(commit_store.clone()),
            branches: BranchService::new(BranchStore::new(metadata.clone()), commit_store),
            snapshots: SnapshotService::new(SnapshotStore::new(snapshots)),
            metadata,
            commit_retries: commit_retries.max(1),
        }
    }

    /// Start the history of a recipe: one root commit on a new `main` branch.
    #[tracing::instrument(skip(self, content))]
    pub async fn init_recipe(
        &self,
        recipe_id: i64,
        content: &RecipeDetails,
        author_id: &str,
    ) -> Result<BranchDto, AppError> {
        content.validate()?;
        self.branches.ensure_not_initialized(recipe_id).await?;

        let commit_id = new_id();
        self.snapshots.save(&commit_id, recipe_id, content).await?;

        let mut tx = self.metadata.begin().await?;
        let commit = self
            .commits
            .create_initial_commit(&mut *tx, commit_id, author_id)
            .await?;
        let branch = self
            .branches
            .create_main_branch(&mut *tx, recipe_id, &commit)
            .await?;
        tx.commit().await?;

        tracing::info!(
            branch_id = %branch.id,
            commit_id = %commit.id,
            "Initialized recipe {}",
            recipe_id
        );
        Ok(BranchDto::from(&branch))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_branches(&self, recipe_id: i64) -> Result<Vec<BranchDto>, AppError> {
        let branches = self.branches.list_by_recipe(recipe_id).await?;
        Ok(branches.iter().map(BranchDto::from).collect())
    }

    /// Fork `source_branch_id` under a new name within `recipe_id`.
    #[tracing::instrument(skip(self))]
    pub async fn create_branch(
        &self,
        recipe_id: i64,
        name: &str,
        source_branch_id: &str,
        author_id: &str,
    ) -> Result<BranchDto, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Branch name is required".to_string()));
        }

        let source = self.branches.get_by_id(source_branch_id).await?;
        self.branches.ensure_unique_name(recipe_id, name).await?;

        let mut tx = self.metadata.begin().await?;
        let branch = self.branches.fork(&mut *tx, &source, name, recipe_id).await?;
        tx.commit().await?;

        tracing::info!(branch_id = %branch.id, "Created branch {:?}", name);
        Ok(BranchDto::from(&branch))
    }

    /// Append a commit carrying `content` to the head of a branch.
    ///
    /// If the head moves while the commit is being written, the branch is
    /// reloaded and the same commit is re-parented onto the new head, up to the
    /// configured number of attempts.
    #[tracing::instrument(skip(self, content))]
    pub async fn commit_to_branch(
        &self,
        branch_id: &str,
        message: &str,
        content: &RecipeDetails,
        author_id: &str,
    ) -> Result<CommitDto, AppError> {
        if message.trim().is_empty() {
            return Err(AppError::Validation("Commit message is required".to_string()));
        }
        content.validate()?;

        let mut branch = self.branches.get_by_id(branch_id).await?;
        let commit_id = new_id();
        self.snapshots
            .save(&commit_id, branch.recipe_id, content)
            .await?;

        let mut attempt = 1;
        loop {
            let parent = self.commits.get_by_id(&branch.head_commit_id).await?;

            let mut tx = self.metadata.begin().await?;
            let commit = self
                .commits
                .create_commit(&mut *tx, commit_id.clone(), author_id, message, Some(&parent))
                .await?;

            match self.branches.add_commit(&mut *tx, &branch, &commit).await {
                Ok(updated) => {
                    tx.commit().await?;
                    tracing::info!(
                        commit_id = %commit.id,
                        parent_id = %parent.id,
                        version = updated.version,
                        "Appended commit to branch"
                    );
                    return Ok(CommitDto::from(&commit));
                }
                Err(AppError::VersionMismatch { .. }) if attempt < self.commit_retries => {
                    tx.rollback().await?;
                    tracing::warn!(
                        attempt,
                        "Branch head moved while committing, retrying on the new head"
                    );
                    attempt += 1;
                    branch = self.branches.get_by_id(branch_id).await?;
                }
                Err(e) => {
                    tx.rollback().await?;
                    if let AppError::VersionMismatch { .. } = e {
                        tracing::warn!(attempt, "Giving up on commit after {} attempts", attempt);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Commits of a branch, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_history(&self, branch_id: &str) -> Result<Vec<CommitDto>, AppError> {
        let history = self.branches.get_history(branch_id).await?;
        Ok(history.iter().map(CommitDto::from).collect())
    }

    /// Start the history of `new_recipe_id` as a copy of an existing branch.
    ///
    /// Snapshots are shared with the source, not duplicated.
    #[tracing::instrument(skip(self))]
    pub async fn copy_recipe(
        &self,
        source_branch_id: &str,
        new_recipe_id: i64,
    ) -> Result<BranchDto, AppError> {
        let source = self.branches.get_by_id(source_branch_id).await?;
        self.branches.ensure_not_initialized(new_recipe_id).await?;

        let mut tx = self.metadata.begin().await?;
        let branch = self
            .branches
            .fork(&mut *tx, &source, MAIN_BRANCH_NAME, new_recipe_id)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AppError::Conflict(format!(
                    "Recipe {} is already initialized",
                    new_recipe_id
                )),
                other => other,
            })?;
        tx.commit().await?;

        tracing::info!(branch_id = %branch.id, "Copied recipe into {}", new_recipe_id);
        Ok(BranchDto::from(&branch))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_commit(&self, commit_id: &str) -> Result<CommitDetailsResponse, AppError> {
        let commit = self.commits.get_by_id(commit_id).await?;
        let snapshot = self.snapshots.get_by_id(&commit.id).await?;
        Ok(CommitDetailsResponse {
            commit: CommitDto::from(&commit),
            content: snapshot.details,
        })
    }

    /// Structural difference between a commit's content and its parent's.
    #[tracing::instrument(skip(self))]
    pub async fn get_changes(&self, commit_id: &str) -> Result<ChangeResponse, AppError> {
        let commit = self.commits.get_by_id(commit_id).await?;
        let current = self.snapshots.get_by_id(&commit.id).await?.details;

        let (old, first_commit) = match &commit.parent_id {
            Some(parent_id) => (self.snapshots.get_by_id(parent_id).await?.details, false),
            None => (RecipeDetails::default(), true),
        };

        let patch = diff_serialized(&old, &current)?;
        Ok(ChangeResponse {
            old,
            current,
            patch,
            first_commit,
        })
    }

    /// Bring the two stores back in line after an interrupted write.
    ///
    /// Snapshots older than `grace` that no commit references are deleted.
    /// Commits without a snapshot are only reported. A grace period reaching
    /// past the representable time range deletes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, grace: Duration) -> Result<ReconcileReport, AppError> {
        let cutoff = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|grace| now().checked_sub_signed(grace));

        // Candidates are listed before commits are read, so a write that lands
        // in between still finds its snapshot kept.
        let snapshot_ids = self.snapshots.list_ids().await?;
        let commit_ids: HashSet<String> = self.commits.list_ids().await?.into_iter().collect();
        let orphans = match &cutoff {
            Some(cutoff) => self.snapshots.find_unreferenced(&commit_ids, cutoff).await?,
            None => {
                tracing::warn!("Grace period {:?} is out of range, keeping all snapshots", grace);
                Vec::new()
            }
        };

        let mut report = ReconcileReport::default();
        for id in orphans {
            match self.snapshots.delete(&id).await {
                Ok(()) => report.removed_snapshots.push(id),
                Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut missing: Vec<String> = commit_ids
            .into_iter()
            .filter(|id| !snapshot_ids.contains(id))
            .collect();
        missing.sort();
        for id in &missing {
            tracing::warn!(commit_id = %id, "Commit has no snapshot");
        }
        report.commits_missing_snapshot = missing;

        if !report.removed_snapshots.is_empty() {
            tracing::info!(
                "Removed {} unreferenced snapshots",
                report.removed_snapshots.len()
            );
        }
        Ok(report)
    }
}
