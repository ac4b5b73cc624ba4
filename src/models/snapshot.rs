//! Snapshot model and the commit-level request/response bodies built on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CommitDto, RecipeDetails};
use crate::diff::PatchOperation;

/// Recipe content stored for exactly one commit, keyed by the commit id.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub recipe_id: i64,
    pub details: RecipeDetails,
    pub created_at: DateTime<Utc>,
}

/// Request body for initializing a recipe's history.
#[derive(Debug, Clone, Deserialize)]
pub struct InitRecipeRequest {
    #[serde(default)]
    pub content: RecipeDetails,
}

/// Request body for committing new content to a branch.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitToBranchRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub content: RecipeDetails,
}

/// A commit together with the content it recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetailsResponse {
    pub commit: CommitDto,
    pub content: RecipeDetails,
}

/// Structural difference between a commit and its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResponse {
    pub old: RecipeDetails,
    pub current: RecipeDetails,
    pub patch: Vec<PatchOperation>,
    pub first_commit: bool,
}
