//! Branch model: a named head pointer plus the commits reachable on it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{new_id, now, Commit};

/// Name of the branch created when a lineage is initialized.
pub const MAIN_BRANCH_NAME: &str = "main";

/// A branch of one recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub recipe_id: i64,
    pub head_commit_id: String,
    /// Every commit considered part of this branch's history.
    pub commits: BTreeSet<String>,
    /// Incremented on every head move; guards concurrent commits.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    /// A fresh branch whose only commit is `commit`.
    pub fn new(recipe_id: i64, name: &str, commit: &Commit) -> Self {
        let created_at = now();
        Self {
            id: new_id(),
            name: name.to_string(),
            recipe_id,
            head_commit_id: commit.id.clone(),
            commits: BTreeSet::from([commit.id.clone()]),
            version: 1,
            created_at,
            updated_at: created_at,
        }
    }

    /// A new branch sharing this branch's history as of now.
    ///
    /// The membership set is copied, so later commits on either branch
    /// are invisible to the other.
    pub fn fork(&self, name: &str, recipe_id: i64) -> Self {
        let created_at = now();
        Self {
            id: new_id(),
            name: name.to_string(),
            recipe_id,
            head_commit_id: self.head_commit_id.clone(),
            commits: self.commits.clone(),
            version: 1,
            created_at,
            updated_at: created_at,
        }
    }

    /// Move the head to `commit` and record it as a member.
    pub fn advance(&mut self, commit: &Commit) {
        self.head_commit_id = commit.id.clone();
        self.commits.insert(commit.id.clone());
        self.version += 1;
        self.updated_at = now();
    }
}

/// Branch descriptor returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDto {
    pub id: String,
    pub name: String,
    pub recipe_id: i64,
    pub head_commit_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Branch> for BranchDto {
    fn from(branch: &Branch) -> Self {
        Self {
            id: branch.id.clone(),
            name: branch.name.clone(),
            recipe_id: branch.recipe_id,
            head_commit_id: branch.head_commit_id.clone(),
            created_at: branch.created_at,
        }
    }
}

/// Request body for creating a branch from an existing one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchRequest {
    #[serde(default)]
    pub branch_name: String,
    pub source_branch_id: String,
}

/// Request body for copying a branch into another recipe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyBranchRequest {
    pub recipe_id: i64,
}
