//! REST API module.
//!
//! Handlers are thin: they extract path, body and author, delegate to
//! [`crate::services::VersionControl`] and serialize the result. Rejections of
//! malformed paths or bodies are turned into the standard error envelope.

mod branches;
mod commits;
mod recipes;

pub use branches::*;
pub use commits::*;
pub use recipes::*;

use axum::Json;

use crate::errors::AppError;

/// Handler result: the JSON body on success, the error envelope otherwise.
pub type ApiResult<T> = Result<Json<T>, AppError>;
