//! Snapshot service: stores and retrieves recipe content per commit.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::db::SnapshotStore;
use crate::errors::AppError;
use crate::models::{now, RecipeDetails, Snapshot};

#[derive(Clone)]
pub struct SnapshotService {
    store: SnapshotStore,
}

impl SnapshotService {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    /// Store the content for `commit_id`.
    ///
    /// Idempotent: if a snapshot already exists for the id, the stored one is
    /// returned unchanged.
    pub async fn save(
        &self,
        commit_id: &str,
        recipe_id: i64,
        content: &RecipeDetails,
    ) -> Result<Snapshot, AppError> {
        let snapshot = Snapshot {
            id: commit_id.to_string(),
            recipe_id,
            details: content.clone(),
            created_at: now(),
        };

        if self.store.insert_if_absent(&snapshot).await? {
            tracing::debug!("Stored snapshot {} for recipe {}", commit_id, recipe_id);
            return Ok(snapshot);
        }

        tracing::debug!("Snapshot {} already stored", commit_id);
        self.get_by_id(commit_id).await
    }

    pub async fn get_by_id(&self, commit_id: &str) -> Result<Snapshot, AppError> {
        self.store
            .get(commit_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Snapshot {} not found", commit_id)))
    }

    /// Snapshots older than `cutoff` whose id is not in `commit_ids`.
    pub async fn find_unreferenced(
        &self,
        commit_ids: &HashSet<String>,
        cutoff: &DateTime<Utc>,
    ) -> Result<Vec<String>, AppError> {
        let candidates = self.store.list_ids_created_before(cutoff).await?;
        Ok(candidates
            .into_iter()
            .filter(|id| !commit_ids.contains(id))
            .collect())
    }

    pub async fn list_ids(&self) -> Result<HashSet<String>, AppError> {
        Ok(self.store.list_ids().await?.into_iter().collect())
    }

    pub async fn delete(&self, commit_id: &str) -> Result<(), AppError> {
        self.store.delete(commit_id).await
    }
}
