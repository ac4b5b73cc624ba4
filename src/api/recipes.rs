//! Recipe lineage endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};

use super::ApiResult;
use crate::auth::AuthorId;
use crate::models::{BranchDto, CreateBranchRequest, InitRecipeRequest};
use crate::AppState;

/// POST /recipes/{recipeId}/init - Start the history of a recipe.
pub async fn init_recipe(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    AuthorId(author_id): AuthorId,
    payload: Result<Json<InitRecipeRequest>, JsonRejection>,
) -> ApiResult<BranchDto> {
    let Path(recipe_id) = path?;
    let Json(request) = payload?;

    let branch = state
        .vcs
        .init_recipe(recipe_id, &request.content, &author_id)
        .await?;
    Ok(Json(branch))
}

/// GET /recipes/{recipeId}/branches - List the branches of a recipe.
pub async fn list_branches(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<BranchDto>> {
    let Path(recipe_id) = path?;
    Ok(Json(state.vcs.list_branches(recipe_id).await?))
}

/// POST /recipes/{recipeId}/branches - Fork a branch under a new name.
pub async fn create_branch(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    AuthorId(author_id): AuthorId,
    payload: Result<Json<CreateBranchRequest>, JsonRejection>,
) -> ApiResult<BranchDto> {
    let Path(recipe_id) = path?;
    let Json(request) = payload?;

    let branch = state
        .vcs
        .create_branch(
            recipe_id,
            &request.branch_name,
            &request.source_branch_id,
            &author_id,
        )
        .await?;
    Ok(Json(branch))
}
