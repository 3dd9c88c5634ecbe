//! Portfolio rows - one row per portfolio, embedded lists stored as JSONB

use super::{enum_text, text_enum, Database, DbError};
use crate::trading::{Holding, PerformanceSnapshot, Portfolio, Transaction, WatchlistEntry};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use uuid::Uuid;

const PORTFOLIO_COLUMNS: &str = r#"
    id, user_id, name, description, is_default, cash_balance, initial_deposit,
    holdings, transactions, watchlist, performance, status, version, created_at, updated_at
"#;

impl<'r> FromRow<'r, PgRow> for Portfolio {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let holdings: Json<Vec<Holding>> = row.try_get("holdings")?;
        let transactions: Json<Vec<Transaction>> = row.try_get("transactions")?;
        let watchlist: Json<Vec<WatchlistEntry>> = row.try_get("watchlist")?;
        let performance: Json<PerformanceSnapshot> = row.try_get("performance")?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_default: row.try_get("is_default")?,
            cash_balance: row.try_get("cash_balance")?,
            initial_deposit: row.try_get("initial_deposit")?,
            holdings: holdings.0,
            transactions: transactions.0,
            watchlist: watchlist.0,
            performance: performance.0,
            status: text_enum(row, "status")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Database {
    // ==========================================
    // Portfolio Operations
    // ==========================================

    pub async fn get_portfolio(&self, id: Uuid) -> Result<Option<Portfolio>, DbError> {
        let sql = format!("SELECT {} FROM portfolios WHERE id = $1", PORTFOLIO_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(self.pool()).await?;

        row.map(|r| Portfolio::from_row(&r))
            .transpose()
            .map_err(DbError::from)
    }

    pub async fn get_default_portfolio(&self, user_id: Uuid) -> Result<Option<Portfolio>, DbError> {
        let sql = format!(
            "SELECT {} FROM portfolios WHERE user_id = $1 AND is_default = TRUE AND status <> 'deleted'",
            PORTFOLIO_COLUMNS
        );
        let row = sqlx::query(&sql).bind(user_id).fetch_optional(self.pool()).await?;

        row.map(|r| Portfolio::from_row(&r))
            .transpose()
            .map_err(DbError::from)
    }

    /// All non-deleted portfolios of a user, default first
    pub async fn list_portfolios(&self, user_id: Uuid) -> Result<Vec<Portfolio>, DbError> {
        let sql = format!(
            r#"
            SELECT {} FROM portfolios
            WHERE user_id = $1 AND status <> 'deleted'
            ORDER BY is_default DESC, created_at ASC
            "#,
            PORTFOLIO_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(self.pool()).await?;

        rows.iter()
            .map(Portfolio::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    pub async fn insert_portfolio(&self, portfolio: &Portfolio) -> Result<(), DbError> {
        self.insert_portfolio_inner(portfolio, false).await.map(|_| ())
    }

    /// Insert unless the user already has a default portfolio. Returns true when a row was written.
    pub async fn insert_portfolio_if_absent(&self, portfolio: &Portfolio) -> Result<bool, DbError> {
        self.insert_portfolio_inner(portfolio, true).await
    }

    async fn insert_portfolio_inner(&self, portfolio: &Portfolio, skip_conflict: bool) -> Result<bool, DbError> {
        let on_conflict = if skip_conflict { "ON CONFLICT DO NOTHING" } else { "" };
        let sql = format!(
            r#"
            INSERT INTO portfolios (
                id, user_id, name, description, is_default, cash_balance, initial_deposit,
                holdings, transactions, watchlist, performance, status, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            {}
            "#,
            on_conflict
        );

        let result = sqlx::query(&sql)
            .bind(portfolio.id)
            .bind(portfolio.user_id)
            .bind(&portfolio.name)
            .bind(&portfolio.description)
            .bind(portfolio.is_default)
            .bind(portfolio.cash_balance)
            .bind(portfolio.initial_deposit)
            .bind(Json(&portfolio.holdings))
            .bind(Json(&portfolio.transactions))
            .bind(Json(&portfolio.watchlist))
            .bind(Json(&portfolio.performance))
            .bind(enum_text(&portfolio.status))
            .bind(portfolio.version)
            .bind(portfolio.created_at)
            .bind(portfolio.updated_at)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Write the whole portfolio back if nobody else has since `expected_version`.
    /// Returns false on a version conflict.
    pub async fn save_portfolio(&self, portfolio: &Portfolio, expected_version: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE portfolios
            SET name = $3,
                description = $4,
                cash_balance = $5,
                holdings = $6,
                transactions = $7,
                watchlist = $8,
                performance = $9,
                status = $10,
                updated_at = $11,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(portfolio.id)
        .bind(expected_version)
        .bind(&portfolio.name)
        .bind(&portfolio.description)
        .bind(portfolio.cash_balance)
        .bind(Json(&portfolio.holdings))
        .bind(Json(&portfolio.transactions))
        .bind(Json(&portfolio.watchlist))
        .bind(Json(&portfolio.performance))
        .bind(enum_text(&portfolio.status))
        .bind(portfolio.updated_at)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
