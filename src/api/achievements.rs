//! Achievement handlers

use super::{created, success, success_list, ApiJson, ApiPath, ApiQuery, ListQuery};
use crate::achievements::{AchievementCategory, CriteriaType, NewAchievement};
use crate::auth::{AuthUser, Role};
use crate::error::AppError;
use crate::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const SORTABLE: &[&str] = &[
    "created_at",
    "updated_at",
    "title",
    "category",
    "rarity",
    "threshold",
];

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    #[serde(rename = "type")]
    pub criteria: CriteriaType,
    pub value: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub category: Option<AchievementCategory>,
}

pub async fn list_achievements(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page_request(SORTABLE)?;
    let achievements = state.achievements.list(&page).await?;
    Ok(success_list(query.project(&achievements)?))
}

pub async fn create_achievement(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(new): ApiJson<NewAchievement>,
) -> Result<Response, AppError> {
    user.require_role(&[Role::Admin])?;
    let achievement = state.achievements.create(new).await?;
    Ok(created(achievement))
}

pub async fn get_my_achievements(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let records = state.achievements.user_achievements(user.id).await?;
    Ok(success_list(records))
}

pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let leaderboard = state.achievements.leaderboard(query.category).await?;
    Ok(success_list(leaderboard))
}

pub async fn update_progress(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<ProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .achievements
        .record_event(user.id, req.criteria, req.value)
        .await?;

    Ok(success(serde_json::json!({
        "message": "Achievement progress updated",
        "updated": outcome.updated,
        "completed": outcome.completed
    })))
}

/// Re-evaluate trading and forum achievements from stored activity
pub async fn check_achievements(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.achievements.evaluate(user.id).await?;
    Ok(success(outcome))
}

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.achievements.progress(user.id, id).await?;
    Ok(success(detail))
}

pub async fn claim_achievement(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.achievements.claim(user.id, user.role, id).await?;
    Ok(success(detail))
}
