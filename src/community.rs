//! Engagement around content - course enrolments and ratings, forum replies
//! and votes, community comments and likes
//!
//! The records here hang off a content row (course, forum post, community post)
//! and are written through their own endpoints rather than the generic CRUD ones.

use crate::auth::AuthUser;
use crate::content::ValidationError;
use crate::db::DbError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const MAX_TEXT_LEN: usize = 10_000;

#[derive(Error, Debug)]
pub enum CommunityError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("You are already enrolled in this course")]
    AlreadyEnrolled,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] DbError),
}

fn require_text(field: &str, text: &str) -> Result<(), ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError(format!("{} is required", field)));
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError(format!(
            "{} must be at most {} characters",
            field, MAX_TEXT_LEN
        )));
    }
    Ok(())
}

// ==========================================
// Course enrolments & ratings
// ==========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseRating {
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: i16,
    pub review: Option<String>,
}

impl RatingRequest {
    /// Validated rating by `user_id`. Blank reviews are dropped.
    pub fn into_rating(self, course_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<CourseRating, ValidationError> {
        if !(1..=5).contains(&self.rating) {
            return Err(ValidationError("rating must be between 1 and 5".into()));
        }
        let review = self
            .review
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if let Some(review) = &review {
            require_text("review", review)?;
        }

        Ok(CourseRating {
            course_id,
            user_id,
            rating: self.rating,
            review,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Average rating of a course. `average` is absent until the first rating.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
}

// ==========================================
// Forum replies & votes
// ==========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ForumReply {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub is_answer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub content: String,
}

impl ForumReply {
    pub fn new(post_id: Uuid, author_id: Uuid, req: TextRequest, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        require_text("content", &req.content)?;
        Ok(Self {
            id: Uuid::new_v4(),
            post_id,
            author_id,
            content: req.content.trim().to_string(),
            is_answer: false,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
    /// Withdraw an earlier vote
    Clear,
}

impl VoteType {
    /// Stored vote value, `None` when the vote is withdrawn
    pub fn value(self) -> Option<i16> {
        match self {
            Self::Upvote => Some(1),
            Self::Downvote => Some(-1),
            Self::Clear => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub vote_type: VoteType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct VoteTally {
    pub upvotes: i64,
    pub downvotes: i64,
}

// ==========================================
// Community comments & likes
// ==========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(post_id: Uuid, author_id: Uuid, req: TextRequest, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        require_text("content", &req.content)?;
        Ok(Self {
            id: Uuid::new_v4(),
            post_id,
            author_id,
            content: req.content.trim().to_string(),
            created_at: now,
        })
    }

    /// The comment's author or an admin
    pub fn can_delete(&self, user: &AuthUser) -> bool {
        user.is_admin() || self.author_id == user.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub likes: i32,
    pub is_liked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn text(content: &str) -> TextRequest {
        TextRequest {
            content: content.to_string(),
        }
    }

    #[test]
    fn test_rating_bounds_and_blank_review() {
        let course = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = Utc::now();

        for rating in [0, 6, -1] {
            let req = RatingRequest { rating, review: None };
            assert!(req.into_rating(course, user, now).is_err(), "{} is out of range", rating);
        }

        let req = RatingRequest {
            rating: 4,
            review: Some("   ".into()),
        };
        let rating = req.into_rating(course, user, now).unwrap();
        assert_eq!(rating.rating, 4);
        assert!(rating.review.is_none());
    }

    #[test]
    fn test_reply_and_comment_require_content() {
        let now = Utc::now();
        assert!(ForumReply::new(Uuid::new_v4(), Uuid::new_v4(), text("  "), now).is_err());
        assert!(Comment::new(Uuid::new_v4(), Uuid::new_v4(), text(""), now).is_err());
        assert!(Comment::new(Uuid::new_v4(), Uuid::new_v4(), text(&"x".repeat(MAX_TEXT_LEN + 1)), now).is_err());

        let reply = ForumReply::new(Uuid::new_v4(), Uuid::new_v4(), text(" Use a stop loss "), now).unwrap();
        assert_eq!(reply.content, "Use a stop loss");
        assert!(!reply.is_answer);
    }

    #[test]
    fn test_vote_values() {
        let req: VoteRequest = serde_json::from_str(r#"{"voteType": "downvote"}"#).unwrap();
        assert_eq!(req.vote_type.value(), Some(-1));
        assert_eq!(VoteType::Upvote.value(), Some(1));
        assert_eq!(VoteType::Clear.value(), None);
        assert!(serde_json::from_str::<VoteRequest>(r#"{"voteType": "sideways"}"#).is_err());
    }

    #[test]
    fn test_comment_delete_permission() {
        let author = AuthUser {
            id: Uuid::new_v4(),
            role: Role::User,
        };
        let comment = Comment::new(Uuid::new_v4(), author.id, text("Nice entry"), Utc::now()).unwrap();

        assert!(comment.can_delete(&author));
        assert!(!comment.can_delete(&AuthUser {
            id: Uuid::new_v4(),
            role: Role::Instructor,
        }));
        assert!(comment.can_delete(&AuthUser {
            id: Uuid::new_v4(),
            role: Role::Admin,
        }));
    }
}
