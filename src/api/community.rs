//! Engagement handlers - enrolments, ratings, forum replies/votes, comments, likes

use super::{created, no_content, success, success_list, ApiJson, ApiPath};
use crate::auth::AuthUser;
use crate::community::{
    Comment, CommunityError, ForumReply, RatingRequest, TextRequest, VoteRequest,
};
use crate::content::{CommunityPost, ContentResource, Course, ForumPost};
use crate::error::AppError;
use crate::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

async fn require<T: ContentResource>(state: &AppState, id: Uuid) -> Result<T, CommunityError> {
    state
        .db
        .get_content::<T>(id)
        .await?
        .ok_or(CommunityError::NotFound(T::NAME))
}

// ==========================================
// Course Enrolments & Ratings
// ==========================================

pub async fn enroll_course(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> Result<Response, AppError> {
    let course = require::<Course>(&state, course_id).await?;
    if !state.db.enroll(course.id, user.id, Utc::now()).await? {
        return Err(CommunityError::AlreadyEnrolled.into());
    }

    info!("User {} enrolled in course {}", user.id, course.id);
    Ok(created(serde_json::json!({
        "message": "Enrolled in course",
        "courseId": course.id
    })))
}

pub async fn rate_course(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(course_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RatingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let rating = req.into_rating(course_id, user.id, Utc::now())?;
    require::<Course>(&state, course_id).await?;
    if !state.db.is_enrolled(course_id, user.id).await? {
        return Err(CommunityError::Forbidden("You must be enrolled to rate this course").into());
    }

    state.db.upsert_rating(&rating).await?;
    let summary = state.db.rating_summary(course_id).await?;
    Ok(success(summary))
}

pub async fn get_course_ratings(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(course_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require::<Course>(&state, course_id).await?;
    let summary = state.db.rating_summary(course_id).await?;
    Ok(success(summary))
}

// ==========================================
// Forum Replies & Votes
// ==========================================

pub async fn add_reply(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<TextRequest>,
) -> Result<Response, AppError> {
    let reply = ForumReply::new(post_id, user.id, req, Utc::now())?;
    require::<ForumPost>(&state, post_id).await?;

    state.db.insert_forum_reply(&reply).await?;
    info!("Reply {} added to forum post {} by {}", reply.id, post_id, user.id);
    Ok(created(reply))
}

pub async fn list_replies(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require::<ForumPost>(&state, post_id).await?;
    let replies = state.db.list_forum_replies(post_id).await?;
    Ok(success_list(replies))
}

/// Only the question's author (or an admin) picks the answer
pub async fn mark_answer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath((post_id, reply_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let post = require::<ForumPost>(&state, post_id).await?;
    if !post.can_modify(&user) {
        return Err(CommunityError::Forbidden("Only the author of the post can mark an answer").into());
    }

    if !state.db.mark_forum_answer(post_id, reply_id, Utc::now()).await? {
        return Err(CommunityError::NotFound("Reply").into());
    }
    let reply = state
        .db
        .get_forum_reply(post_id, reply_id)
        .await?
        .ok_or(CommunityError::NotFound("Reply"))?;
    Ok(success(reply))
}

pub async fn vote_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    require::<ForumPost>(&state, post_id).await?;
    let tally = state
        .db
        .cast_forum_vote(post_id, post_id, user.id, req.vote_type)
        .await?;
    Ok(success(tally))
}

pub async fn vote_reply(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath((post_id, reply_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reply = state
        .db
        .get_forum_reply(post_id, reply_id)
        .await?
        .ok_or(CommunityError::NotFound("Reply"))?;
    let tally = state
        .db
        .cast_forum_vote(post_id, reply.id, user.id, req.vote_type)
        .await?;
    Ok(success(tally))
}

// ==========================================
// Community Comments & Likes
// ==========================================

pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<TextRequest>,
) -> Result<Response, AppError> {
    let comment = Comment::new(post_id, user.id, req, Utc::now())?;
    require::<CommunityPost>(&state, post_id).await?;

    state.db.insert_comment(&comment).await?;
    Ok(created(comment))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require::<CommunityPost>(&state, post_id).await?;
    let comments = state.db.list_comments(post_id).await?;
    Ok(success_list(comments))
}

pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath((post_id, comment_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let comment = state
        .db
        .get_comment(post_id, comment_id)
        .await?
        .ok_or(CommunityError::NotFound("Comment"))?;
    if !comment.can_delete(&user) {
        return Err(CommunityError::Forbidden("You can only delete your own comments").into());
    }

    state.db.delete_comment(comment.id).await?;
    info!("Comment {} deleted by {}", comment.id, user.id);
    Ok(no_content())
}

pub async fn toggle_like(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let like = state
        .db
        .toggle_like(post_id, user.id)
        .await?
        .ok_or(CommunityError::NotFound(CommunityPost::NAME))?;
    Ok(success(like))
}
