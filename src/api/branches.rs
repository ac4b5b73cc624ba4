//! Branch endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use super::ApiResult;
use crate::auth::AuthorId;
use crate::models::{BranchDto, CommitDto, CommitToBranchRequest, CopyBranchRequest};
use crate::AppState;

/// POST /branches/{branchId}/commit - Append a commit to a branch.
pub async fn commit_to_branch(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
    AuthorId(author_id): AuthorId,
    payload: Result<Json<CommitToBranchRequest>, JsonRejection>,
) -> ApiResult<CommitDto> {
    let Json(request) = payload?;

    let commit = state
        .vcs
        .commit_to_branch(&branch_id, &request.message, &request.content, &author_id)
        .await?;
    Ok(Json(commit))
}

/// GET /branches/{branchId}/history - Commits of a branch, newest first.
pub async fn branch_history(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
) -> ApiResult<Vec<CommitDto>> {
    Ok(Json(state.vcs.get_history(&branch_id).await?))
}

/// POST /branches/{branchId}/copy - Start another recipe's history from a branch.
pub async fn copy_branch(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
    payload: Result<Json<CopyBranchRequest>, JsonRejection>,
) -> ApiResult<BranchDto> {
    let Json(request) = payload?;
    Ok(Json(
        state.vcs.copy_recipe(&branch_id, request.recipe_id).await?,
    ))
}
