//! Learning and community content - courses, modules, lessons, assignments and posts
//!
//! Every resource is a plain table row. `ContentResource` describes how a
//! resource is created from a request body, patched, validated and who may
//! write it; the HTTP layer serves all of them through the same handlers.

use crate::auth::{AuthUser, Role};
use crate::db::ContentTable;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const MAX_TITLE_LEN: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Who may write a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Instructors and admins only
    Staff,
    /// Instructors and admins create; only the owning instructor or an admin may change or delete
    Owner,
    /// Any user may create; only the author or an admin may change or delete
    Author,
}

pub trait ContentResource: ContentTable + Serialize + Send + Sync + 'static {
    const NAME: &'static str;
    const POLICY: WritePolicy;

    type New: DeserializeOwned + Send + 'static;
    type Update: DeserializeOwned + Send + 'static;

    fn create(new: Self::New, creator: Uuid, now: DateTime<Utc>) -> Self;
    fn apply(&mut self, update: Self::Update, now: DateTime<Utc>);
    fn validate(&self) -> Result<(), ValidationError>;

    /// Author or owner of the record, for `Author` and `Owner` resources
    fn author(&self) -> Option<Uuid> {
        None
    }

    fn can_create(user: &AuthUser) -> bool {
        match Self::POLICY {
            WritePolicy::Staff | WritePolicy::Owner => matches!(user.role, Role::Instructor | Role::Admin),
            WritePolicy::Author => true,
        }
    }

    fn can_modify(&self, user: &AuthUser) -> bool {
        match Self::POLICY {
            WritePolicy::Staff => matches!(user.role, Role::Instructor | Role::Admin),
            WritePolicy::Owner => {
                user.is_admin() || (user.role == Role::Instructor && self.author() == Some(user.id))
            }
            WritePolicy::Author => user.is_admin() || self.author() == Some(user.id),
        }
    }
}

fn require_title(title: &str) -> Result<(), ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError("title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError(format!(
            "title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

// ==========================================
// Courses
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl TryFrom<String> for CourseLevel {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(ValidationError(format!("Unknown course level '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    #[sqlx(try_from = "String")]
    pub level: CourseLevel,
    pub price: Decimal,
    pub instructor_id: Uuid,
    pub published: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourse {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub price: Option<Decimal>,
    pub published: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl ContentResource for Course {
    const NAME: &'static str = "Course";
    const POLICY: WritePolicy = WritePolicy::Owner;

    type New = NewCourse;
    type Update = UpdateCourse;

    fn create(new: NewCourse, creator: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: new.title.trim().to_string(),
            description: new.description,
            category: new.category,
            level: new.level,
            price: new.price,
            instructor_id: creator,
            published: new.published,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: UpdateCourse, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(level) = update.level {
            self.level = level;
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(published) = update.published {
            self.published = published;
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_title(&self.title)?;
        if self.price.is_sign_negative() {
            return Err(ValidationError("price must not be negative".into()));
        }
        Ok(())
    }

    fn author(&self) -> Option<Uuid> {
        Some(self.instructor_id)
    }
}

// ==========================================
// Course modules
// ==========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseModule {
    pub course_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseModule {
    pub title: Option<String>,
    pub description: Option<String>,
    pub position: Option<i32>,
}

impl ContentResource for CourseModule {
    const NAME: &'static str = "Module";
    const POLICY: WritePolicy = WritePolicy::Staff;

    type New = NewCourseModule;
    type Update = UpdateCourseModule;

    fn create(new: NewCourseModule, _creator: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            course_id: new.course_id,
            title: new.title.trim().to_string(),
            description: new.description,
            position: new.position,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: UpdateCourseModule, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(position) = update.position {
            self.position = position;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_title(&self.title)?;
        if self.position < 0 {
            return Err(ValidationError("position must not be negative".into()));
        }
        Ok(())
    }
}

// ==========================================
// Lessons
// ==========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub content: String,
    pub video_url: Option<String>,
    pub duration_minutes: i32,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLesson {
    pub module_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub video_url: Option<String>,
    pub duration_minutes: i32,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLesson {
    pub title: Option<String>,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    pub position: Option<i32>,
}

impl ContentResource for Lesson {
    const NAME: &'static str = "Lesson";
    const POLICY: WritePolicy = WritePolicy::Staff;

    type New = NewLesson;
    type Update = UpdateLesson;

    fn create(new: NewLesson, _creator: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            module_id: new.module_id,
            title: new.title.trim().to_string(),
            content: new.content,
            video_url: new.video_url,
            duration_minutes: new.duration_minutes,
            position: new.position,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: UpdateLesson, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(video_url) = update.video_url {
            self.video_url = Some(video_url);
        }
        if let Some(duration) = update.duration_minutes {
            self.duration_minutes = duration;
        }
        if let Some(position) = update.position {
            self.position = position;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_title(&self.title)?;
        if self.duration_minutes <= 0 {
            return Err(ValidationError("durationMinutes must be positive".into()));
        }
        if let Some(url) = &self.video_url {
            url::Url::parse(url).map_err(|_| ValidationError(format!("invalid videoUrl '{}'", url)))?;
        }
        Ok(())
    }
}

// ==========================================
// Assignments
// ==========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub max_score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub course_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default = "default_max_score")]
    pub max_score: i32,
}

fn default_max_score() -> i32 {
    100
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssignment {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub max_score: Option<i32>,
}

impl ContentResource for Assignment {
    const NAME: &'static str = "Assignment";
    const POLICY: WritePolicy = WritePolicy::Staff;

    type New = NewAssignment;
    type Update = UpdateAssignment;

    fn create(new: NewAssignment, _creator: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            course_id: new.course_id,
            title: new.title.trim().to_string(),
            description: new.description,
            due_date: new.due_date,
            max_score: new.max_score,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: UpdateAssignment, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(due_date) = update.due_date {
            self.due_date = Some(due_date);
        }
        if let Some(max_score) = update.max_score {
            self.max_score = max_score;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_title(&self.title)?;
        if self.max_score <= 0 {
            return Err(ValidationError("maxScore must be positive".into()));
        }
        Ok(())
    }
}

// ==========================================
// Forum posts
// ==========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ForumPost {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    pub category: String,
    pub tags: Vec<String>,
    /// Set once the author marks a reply as the answer
    pub is_answered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewForumPost {
    pub title: String,
    pub body: String,
    #[serde(default = "default_forum_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_forum_category() -> String {
    "general".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateForumPost {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ContentResource for ForumPost {
    const NAME: &'static str = "Forum post";
    const POLICY: WritePolicy = WritePolicy::Author;

    type New = NewForumPost;
    type Update = UpdateForumPost;

    fn create(new: NewForumPost, creator: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id: creator,
            title: new.title.trim().to_string(),
            body: new.body,
            category: new.category,
            tags: new.tags,
            is_answered: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: UpdateForumPost, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(body) = update.body {
            self.body = body;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_title(&self.title)?;
        if self.body.trim().is_empty() {
            return Err(ValidationError("body is required".into()));
        }
        Ok(())
    }

    fn author(&self) -> Option<Uuid> {
        Some(self.author_id)
    }
}

// ==========================================
// Community posts
// ==========================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommunityPost {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    /// Maintained by the like toggle, never written through updates
    pub likes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewCommunityPost {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCommunityPost {
    pub content: Option<String>,
}

impl ContentResource for CommunityPost {
    const NAME: &'static str = "Community post";
    const POLICY: WritePolicy = WritePolicy::Author;

    type New = NewCommunityPost;
    type Update = UpdateCommunityPost;

    fn create(new: NewCommunityPost, creator: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id: creator,
            content: new.content,
            likes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: UpdateCommunityPost, now: DateTime<Utc>) {
        if let Some(content) = update.content {
            self.content = content;
        }
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.content.trim().is_empty() {
            return Err(ValidationError("content is required".into()));
        }
        Ok(())
    }

    fn author(&self) -> Option<Uuid> {
        Some(self.author_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_course_defaults_and_validation() {
        let new: NewCourse = serde_json::from_str(r#"{"title": "  Options 101 "}"#).unwrap();
        let creator = Uuid::new_v4();
        let mut course = Course::create(new, creator, Utc::now());

        assert_eq!(course.title, "Options 101");
        assert_eq!(course.level, CourseLevel::Beginner);
        assert_eq!(course.instructor_id, creator);
        assert!(course.validate().is_ok());

        course.apply(
            UpdateCourse {
                price: Some(dec!(-1)),
                ..Default::default()
            },
            Utc::now(),
        );
        assert!(course.validate().is_err());
    }

    #[test]
    fn test_blank_titles_rejected() {
        let new: NewForumPost = serde_json::from_str(r#"{"title": "   ", "body": "hello"}"#).unwrap();
        let post = ForumPost::create(new, Uuid::new_v4(), Utc::now());
        assert_eq!(post.category, "general");
        assert_eq!(post.validate().unwrap_err(), ValidationError("title is required".into()));
    }

    #[test]
    fn test_lesson_duration_and_url() {
        let body = r#"{
            "moduleId": "6f1c1f8e-5d55-4c1b-9f3e-0a3b4c5d6e7f",
            "title": "Candlesticks",
            "durationMinutes": 0
        }"#;
        let new: NewLesson = serde_json::from_str(body).unwrap();
        let mut lesson = Lesson::create(new, Uuid::new_v4(), Utc::now());
        assert!(lesson.validate().is_err());

        lesson.duration_minutes = 12;
        lesson.video_url = Some("not a url".into());
        assert!(lesson.validate().is_err());

        lesson.video_url = Some("https://videos.example.com/candles.mp4".into());
        assert!(lesson.validate().is_ok());
    }

    #[test]
    fn test_assignment_default_score() {
        let body = r#"{"courseId": "6f1c1f8e-5d55-4c1b-9f3e-0a3b4c5d6e7f", "title": "Quiz 1"}"#;
        let new: NewAssignment = serde_json::from_str(body).unwrap();
        assert_eq!(new.max_score, 100);
    }

    #[test]
    fn test_write_policies() {
        assert!(!Course::can_create(&user(Role::User)));
        assert!(Course::can_create(&user(Role::Instructor)));
        assert!(ForumPost::can_create(&user(Role::User)));

        let author = user(Role::User);
        let post = CommunityPost::create(
            NewCommunityPost {
                content: "Bought my first ETF".into(),
            },
            author.id,
            Utc::now(),
        );
        assert!(post.can_modify(&author));
        assert!(!post.can_modify(&user(Role::Instructor)));
        assert!(post.can_modify(&user(Role::Admin)));

        let owner = user(Role::Instructor);
        let new: NewCourse = serde_json::from_str(r#"{"title": "Options 101"}"#).unwrap();
        let course = Course::create(new, owner.id, Utc::now());
        assert!(course.can_modify(&owner));
        assert!(!course.can_modify(&user(Role::Instructor)));
        assert!(!course.can_modify(&user(Role::User)));
        assert!(course.can_modify(&user(Role::Admin)));
    }
}
