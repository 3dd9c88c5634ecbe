//! Database module for PostgreSQL operations using SQLx
//! Uses runtime query checking (no compile-time DATABASE_URL needed)

mod achievements;
mod community;
mod content;
mod market_data;
mod portfolio;
mod users;

pub use content::ContentTable;
pub use users::UserProfile;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const MAX_CONNECTIONS: u32 = 10;
const SCHEMA: &str = include_str!("../../migrations/schema.sql");

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;

        info!("Database pool created with max {} connections", MAX_CONNECTIONS);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create a pool that only connects on first use
    pub fn connect_lazy(database_url: &str) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_lazy(database_url)?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes that do not exist yet
    pub async fn apply_schema(&self) -> Result<(), DbError> {
        sqlx::raw_sql(SCHEMA).execute(self.pool()).await?;
        info!("Database schema applied");
        Ok(())
    }
}

/// One page of a list query. `order_by` is only ever built from whitelisted
/// column names (see `api::query`), never from raw client input.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
    pub order_by: String,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit.max(0))
    }
}

// ==========================================
// Text-column enum helpers
// ==========================================

/// Decode a TEXT column into a unit-variant enum using its serde names.
pub(crate) fn text_enum<T: DeserializeOwned>(row: &PgRow, column: &str) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    serde_json::from_value(serde_json::Value::String(raw)).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Encode a unit-variant enum as the TEXT stored in the database.
pub(crate) fn enum_text<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::UpdateFrequency;

    #[test]
    fn test_page_offset() {
        let page = PageRequest {
            page: 3,
            limit: 20,
            order_by: "created_at DESC".to_string(),
        };
        assert_eq!(page.offset(), 40);

        let huge = PageRequest {
            page: i64::MAX,
            limit: 100,
            order_by: "created_at DESC".to_string(),
        };
        assert_eq!(huge.offset(), i64::MAX);
    }

    #[test]
    fn test_enum_text_uses_serde_names() {
        assert_eq!(enum_text(&UpdateFrequency::OneMin), "1min");
        assert_eq!(enum_text(&UpdateFrequency::Realtime), "realtime");
    }

    #[test]
    fn test_schema_is_idempotent() {
        let mut checked = 0;
        for statement in SCHEMA.split(';') {
            let sql = statement
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            let sql = sql.trim();
            if sql.is_empty() {
                continue;
            }
            assert!(
                sql.contains("IF NOT EXISTS"),
                "Schema statement must be re-runnable: {}",
                sql.lines().next().unwrap_or_default()
            );
            checked += 1;
        }
        assert!(checked >= 10, "Expected every table to be covered, checked {}", checked);
    }
}
