//! Commit endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::ApiResult;
use crate::models::{ChangeResponse, CommitDetailsResponse};
use crate::AppState;

/// GET /commits/{commitId} - A commit and the content it recorded.
pub async fn get_commit(
    State(state): State<AppState>,
    Path(commit_id): Path<String>,
) -> ApiResult<CommitDetailsResponse> {
    Ok(Json(state.vcs.get_commit(&commit_id).await?))
}

/// GET /commits/{commitId}/changes - Difference from the parent commit.
pub async fn get_changes(
    State(state): State<AppState>,
    Path(commit_id): Path<String>,
) -> ApiResult<ChangeResponse> {
    Ok(Json(state.vcs.get_changes(&commit_id).await?))
}
