//! Enrolments, ratings, forum replies/votes, community comments/likes

use super::content::reference_error;
use super::{Database, DbError};
use crate::community::{
    Comment, CourseRating, ForumReply, LikeState, RatingSummary, VoteTally, VoteType,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

impl Database {
    // ==========================================
    // Course Enrolments & Ratings
    // ==========================================

    /// Returns false when the user was already enrolled
    pub async fn enroll(&self, course_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO course_enrollments (course_id, user_id, enrolled_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (course_id, user_id) DO NOTHING
            "#,
        )
        .bind(course_id)
        .bind(user_id)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(reference_error)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_enrolled(&self, course_id: Uuid, user_id: Uuid) -> Result<bool, DbError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM course_enrollments WHERE course_id = $1 AND user_id = $2)")
            .bind(course_id)
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;

        Ok(row.try_get(0)?)
    }

    /// Insert or replace the user's rating of a course
    pub async fn upsert_rating(&self, rating: &CourseRating) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO course_ratings (course_id, user_id, rating, review, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (course_id, user_id) DO UPDATE SET
                rating = EXCLUDED.rating,
                review = EXCLUDED.review,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(rating.course_id)
        .bind(rating.user_id)
        .bind(rating.rating)
        .bind(&rating.review)
        .bind(rating.created_at)
        .bind(rating.updated_at)
        .execute(self.pool())
        .await
        .map_err(reference_error)?;

        Ok(())
    }

    pub async fn rating_summary(&self, course_id: Uuid) -> Result<RatingSummary, DbError> {
        let summary = sqlx::query_as::<_, RatingSummary>(
            "SELECT AVG(rating)::float8 AS average, COUNT(*) AS count FROM course_ratings WHERE course_id = $1",
        )
        .bind(course_id)
        .fetch_one(self.pool())
        .await?;

        Ok(summary)
    }

    // ==========================================
    // Forum Replies & Votes
    // ==========================================

    pub async fn insert_forum_reply(&self, reply: &ForumReply) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO forum_replies (id, post_id, author_id, content, is_answer, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reply.id)
        .bind(reply.post_id)
        .bind(reply.author_id)
        .bind(&reply.content)
        .bind(reply.is_answer)
        .bind(reply.created_at)
        .bind(reply.updated_at)
        .execute(self.pool())
        .await
        .map_err(reference_error)?;

        Ok(())
    }

    /// Replies of a post, oldest first
    pub async fn list_forum_replies(&self, post_id: Uuid) -> Result<Vec<ForumReply>, DbError> {
        let replies = sqlx::query_as::<_, ForumReply>(
            "SELECT * FROM forum_replies WHERE post_id = $1 ORDER BY created_at ASC",
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await?;

        Ok(replies)
    }

    pub async fn get_forum_reply(&self, post_id: Uuid, reply_id: Uuid) -> Result<Option<ForumReply>, DbError> {
        let reply = sqlx::query_as::<_, ForumReply>("SELECT * FROM forum_replies WHERE id = $1 AND post_id = $2")
            .bind(reply_id)
            .bind(post_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(reply)
    }

    /// Make `reply_id` the single accepted answer of the post and flag the post
    /// as answered. Returns false when the reply does not belong to the post.
    pub async fn mark_forum_answer(&self, post_id: Uuid, reply_id: Uuid, now: DateTime<Utc>) -> Result<bool, DbError> {
        let mut tx = self.pool().begin().await?;

        let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM forum_replies WHERE id = $1 AND post_id = $2)")
            .bind(reply_id)
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?
            .try_get(0)?;
        if !exists {
            tx.rollback().await?;
            return Ok(false);
        }

        // Unmark any earlier answer in the same statement
        sqlx::query(
            r#"
            UPDATE forum_replies
            SET is_answer = (id = $2), updated_at = $3
            WHERE post_id = $1 AND (id = $2 OR is_answer)
            "#,
        )
        .bind(post_id)
        .bind(reply_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE forum_posts SET is_answered = TRUE WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Reply {} marked as the answer to forum post {}", reply_id, post_id);
        Ok(true)
    }

    /// Replace the user's vote on a post or reply and return the new tally
    pub async fn cast_forum_vote(
        &self,
        post_id: Uuid,
        target_id: Uuid,
        user_id: Uuid,
        vote: VoteType,
    ) -> Result<VoteTally, DbError> {
        match vote.value() {
            Some(value) => {
                sqlx::query(
                    r#"
                    INSERT INTO forum_votes (post_id, target_id, user_id, value)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (target_id, user_id) DO UPDATE SET value = EXCLUDED.value
                    "#,
                )
                .bind(post_id)
                .bind(target_id)
                .bind(user_id)
                .bind(value)
                .execute(self.pool())
                .await
                .map_err(reference_error)?;
            }
            None => {
                sqlx::query("DELETE FROM forum_votes WHERE target_id = $1 AND user_id = $2")
                    .bind(target_id)
                    .bind(user_id)
                    .execute(self.pool())
                    .await?;
            }
        }

        self.vote_tally(target_id).await
    }

    pub async fn vote_tally(&self, target_id: Uuid) -> Result<VoteTally, DbError> {
        let tally = sqlx::query_as::<_, VoteTally>(
            r#"
            SELECT COUNT(*) FILTER (WHERE value = 1) AS upvotes,
                   COUNT(*) FILTER (WHERE value = -1) AS downvotes
            FROM forum_votes
            WHERE target_id = $1
            "#,
        )
        .bind(target_id)
        .fetch_one(self.pool())
        .await?;

        Ok(tally)
    }

    /// Forum posts plus replies written by the user
    pub async fn forum_activity_count(&self, user_id: Uuid) -> Result<i64, DbError> {
        let row = sqlx::query(
            r#"
            SELECT (SELECT COUNT(*) FROM forum_posts WHERE author_id = $1)
                 + (SELECT COUNT(*) FROM forum_replies WHERE author_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;

        Ok(row.try_get(0)?)
    }

    // ==========================================
    // Community Comments & Likes
    // ==========================================

    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO community_comments (id, post_id, author_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(comment.id)
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(self.pool())
        .await
        .map_err(reference_error)?;

        Ok(())
    }

    /// Comments of a post, oldest first
    pub async fn list_comments(&self, post_id: Uuid) -> Result<Vec<Comment>, DbError> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM community_comments WHERE post_id = $1 ORDER BY created_at ASC",
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await?;

        Ok(comments)
    }

    pub async fn get_comment(&self, post_id: Uuid, comment_id: Uuid) -> Result<Option<Comment>, DbError> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM community_comments WHERE id = $1 AND post_id = $2")
            .bind(comment_id)
            .bind(post_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(comment)
    }

    pub async fn delete_comment(&self, comment_id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM community_comments WHERE id = $1")
            .bind(comment_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Like the post, or take the like back if the user already liked it.
    /// The post row is locked so the counter stays equal to the number of likes.
    /// Returns `None` when the post does not exist.
    pub async fn toggle_like(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<LikeState>, DbError> {
        let mut tx = self.pool().begin().await?;

        let post = sqlx::query("SELECT id FROM community_posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if post.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let removed = sqlx::query("DELETE FROM community_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if !removed {
            sqlx::query("INSERT INTO community_likes (post_id, user_id) VALUES ($1, $2)")
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let delta: i32 = if removed { -1 } else { 1 };
        let likes: i32 = sqlx::query("UPDATE community_posts SET likes = likes + $2 WHERE id = $1 RETURNING likes")
            .bind(post_id)
            .bind(delta)
            .fetch_one(&mut *tx)
            .await?
            .try_get("likes")?;
        tx.commit().await?;

        Ok(Some(LikeState {
            likes,
            is_liked: !removed,
        }))
    }
}
