//! Commit model: an immutable point in a recipe's history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::now;

/// Message recorded on the commit created by lineage initialization.
pub const INITIAL_COMMIT_MESSAGE: &str = "create recipe.";

/// Commit metadata. Content lives in the snapshot with the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    pub author_id: String,
    pub message: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Commit {
    /// Build a commit on top of `parent`.
    ///
    /// The timestamp never precedes the parent's, so history stays ordered
    /// even if the wall clock steps backwards.
    pub fn new(id: String, author_id: &str, message: &str, parent: Option<&Commit>) -> Self {
        let created_at = match parent {
            Some(parent) => now().max(parent.created_at),
            None => now(),
        };

        Self {
            id,
            author_id: author_id.to_string(),
            message: message.to_string(),
            parent_id: parent.map(|p| p.id.clone()),
            created_at,
        }
    }
}

/// Commit descriptor returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDto {
    pub id: String,
    pub author_id: String,
    pub message: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Commit> for CommitDto {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id.clone(),
            author_id: commit.author_id.clone(),
            message: commit.message.clone(),
            parent_id: commit.parent_id.clone(),
            created_at: commit.created_at,
        }
    }
}
