//! User profile handlers

use super::success;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use std::sync::Arc;

/// Profile of the caller, created on first request
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.db.ensure_user(user.id, user.role).await?;
    let profile = state
        .db
        .get_user(user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(success(profile))
}
