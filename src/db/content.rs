//! Content tables - generic list/get/insert/update/delete over plain rows

use super::{Database, DbError, PageRequest};
use crate::content::{Assignment, CommunityPost, Course, CourseModule, ForumPost, Lesson};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, Postgres};
use uuid::Uuid;

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// A table of content rows. `WRITE_COLUMNS` lists every column except `id`,
/// `created_at` and `updated_at`, in the order `bind_fields` binds them.
pub trait ContentTable: for<'r> FromRow<'r, PgRow> + Send + Unpin {
    const TABLE: &'static str;
    const WRITE_COLUMNS: &'static [&'static str];
    /// Columns a client may sort by
    const SORTABLE: &'static [&'static str];
    /// `(column, query parameter)` used to filter by parent record
    const PARENT: Option<(&'static str, &'static str)> = None;

    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
    fn bind_fields<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q>;
}

impl Database {
    // ==========================================
    // Content Operations
    // ==========================================

    pub async fn list_content<T: ContentTable>(
        &self,
        page: &PageRequest,
        parent: Option<Uuid>,
    ) -> Result<Vec<T>, DbError> {
        let sql = list_sql::<T>(page, parent.is_some());
        let mut query = sqlx::query_as::<_, T>(&sql).bind(page.limit).bind(page.offset());
        if let (Some(_), Some(id)) = (T::PARENT, parent) {
            query = query.bind(id);
        }

        Ok(query.fetch_all(self.pool()).await?)
    }

    pub async fn get_content<T: ContentTable>(&self, id: Uuid) -> Result<Option<T>, DbError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", T::TABLE);
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row)
    }

    pub async fn insert_content<T: ContentTable>(&self, record: &T) -> Result<(), DbError> {
        let count = T::WRITE_COLUMNS.len();
        let placeholders: Vec<String> = (2..count + 2).map(|i| format!("${}", i)).collect();
        let sql = format!(
            "INSERT INTO {} (id, {}, created_at, updated_at) VALUES ($1, {}, ${}, ${})",
            T::TABLE,
            T::WRITE_COLUMNS.join(", "),
            placeholders.join(", "),
            count + 2,
            count + 3
        );

        let query = record.bind_fields(sqlx::query(&sql).bind(record.id()));
        let result = query
            .bind(record.created_at())
            .bind(record.updated_at())
            .execute(self.pool())
            .await;

        result.map(|_| ()).map_err(reference_error)
    }

    pub async fn update_content<T: ContentTable>(&self, record: &T) -> Result<(), DbError> {
        let count = T::WRITE_COLUMNS.len();
        let assignments: Vec<String> = T::WRITE_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ${}", column, i + 2))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}, updated_at = ${} WHERE id = $1",
            T::TABLE,
            assignments.join(", "),
            count + 2
        );

        let query = record.bind_fields(sqlx::query(&sql).bind(record.id()));
        let result = query
            .bind(record.updated_at())
            .execute(self.pool())
            .await
            .map_err(reference_error)?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_content<T: ContentTable>(&self, id: Uuid) -> Result<(), DbError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", T::TABLE);
        let result = sqlx::query(&sql).bind(id).execute(self.pool()).await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

/// `SELECT` for one page of rows, filtered by parent (`$3`) when the table has one
fn list_sql<T: ContentTable>(page: &PageRequest, by_parent: bool) -> String {
    let filter = match T::PARENT {
        Some((column, _)) if by_parent => format!("WHERE {} = $3 ", column),
        _ => String::new(),
    };
    format!(
        "SELECT * FROM {} {}ORDER BY {} LIMIT $1 OFFSET $2",
        T::TABLE,
        filter,
        page.order_by
    )
}

/// A missing parent row is a client error, not a server failure
pub(super) fn reference_error(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(e) if e.is_foreign_key_violation() => {
            DbError::InvalidData("Referenced parent record does not exist".to_string())
        }
        _ => DbError::Sqlx(err),
    }
}

// ==========================================
// Table definitions
// ==========================================

impl ContentTable for Course {
    const TABLE: &'static str = "courses";
    const WRITE_COLUMNS: &'static [&'static str] = &[
        "title",
        "description",
        "category",
        "level",
        "price",
        "instructor_id",
        "published",
        "tags",
    ];
    const SORTABLE: &'static [&'static str] =
        &["created_at", "updated_at", "title", "category", "level", "price"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn bind_fields<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(&self.title)
            .bind(&self.description)
            .bind(&self.category)
            .bind(self.level.as_str())
            .bind(self.price)
            .bind(self.instructor_id)
            .bind(self.published)
            .bind(&self.tags)
    }
}

impl ContentTable for CourseModule {
    const TABLE: &'static str = "course_modules";
    const WRITE_COLUMNS: &'static [&'static str] = &["course_id", "title", "description", "position"];
    const SORTABLE: &'static [&'static str] = &["created_at", "updated_at", "title", "position"];
    const PARENT: Option<(&'static str, &'static str)> = Some(("course_id", "course"));

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn bind_fields<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.course_id)
            .bind(&self.title)
            .bind(&self.description)
            .bind(self.position)
    }
}

impl ContentTable for Lesson {
    const TABLE: &'static str = "lessons";
    const WRITE_COLUMNS: &'static [&'static str] = &[
        "module_id",
        "title",
        "content",
        "video_url",
        "duration_minutes",
        "position",
    ];
    const SORTABLE: &'static [&'static str] =
        &["created_at", "updated_at", "title", "position", "duration_minutes"];
    const PARENT: Option<(&'static str, &'static str)> = Some(("module_id", "module"));

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn bind_fields<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.module_id)
            .bind(&self.title)
            .bind(&self.content)
            .bind(&self.video_url)
            .bind(self.duration_minutes)
            .bind(self.position)
    }
}

impl ContentTable for Assignment {
    const TABLE: &'static str = "assignments";
    const WRITE_COLUMNS: &'static [&'static str] =
        &["course_id", "title", "description", "due_date", "max_score"];
    const SORTABLE: &'static [&'static str] =
        &["created_at", "updated_at", "title", "due_date", "max_score"];
    const PARENT: Option<(&'static str, &'static str)> = Some(("course_id", "course"));

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn bind_fields<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.course_id)
            .bind(&self.title)
            .bind(&self.description)
            .bind(self.due_date)
            .bind(self.max_score)
    }
}

impl ContentTable for ForumPost {
    const TABLE: &'static str = "forum_posts";
    const WRITE_COLUMNS: &'static [&'static str] =
        &["author_id", "title", "body", "category", "tags"];
    const SORTABLE: &'static [&'static str] = &["created_at", "updated_at", "title", "category"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn bind_fields<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.author_id)
            .bind(&self.title)
            .bind(&self.body)
            .bind(&self.category)
            .bind(&self.tags)
    }
}

impl ContentTable for CommunityPost {
    const TABLE: &'static str = "community_posts";
    const WRITE_COLUMNS: &'static [&'static str] = &["author_id", "content"];
    const SORTABLE: &'static [&'static str] = &["created_at", "updated_at", "likes"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn bind_fields<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query.bind(self.author_id).bind(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_table<T: ContentTable>() {
        assert!(T::SORTABLE.contains(&"created_at"), "{} must sort by created_at", T::TABLE);
        for reserved in ["id", "created_at", "updated_at"] {
            assert!(
                !T::WRITE_COLUMNS.contains(&reserved),
                "{} lists {} as a write column",
                T::TABLE,
                reserved
            );
        }
        if let Some((column, _)) = T::PARENT {
            assert!(T::WRITE_COLUMNS.contains(&column));
        }
    }

    fn page(order_by: &str) -> PageRequest {
        PageRequest {
            page: 2,
            limit: 20,
            order_by: order_by.to_string(),
        }
    }

    #[test]
    fn test_list_sql_filters_by_parent() {
        let sql = list_sql::<CourseModule>(&page("position ASC"), true);
        assert_eq!(
            sql,
            "SELECT * FROM course_modules WHERE course_id = $3 ORDER BY position ASC LIMIT $1 OFFSET $2"
        );

        let sql = list_sql::<CourseModule>(&page("position ASC"), false);
        assert_eq!(sql, "SELECT * FROM course_modules ORDER BY position ASC LIMIT $1 OFFSET $2");

        // Tables without a parent ignore the filter
        let sql = list_sql::<Course>(&page("created_at DESC"), true);
        assert_eq!(sql, "SELECT * FROM courses ORDER BY created_at DESC LIMIT $1 OFFSET $2");
    }

    #[test]
    fn test_table_definitions() {
        check_table::<Course>();
        check_table::<CourseModule>();
        check_table::<Lesson>();
        check_table::<Assignment>();
        check_table::<ForumPost>();
        check_table::<CommunityPost>();
    }
}
