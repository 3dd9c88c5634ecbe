//! Application error - the single error type that reaches the HTTP layer
//!
//! Every module keeps its own `thiserror` enum; they are folded into an
//! `AppError` (status code + message) at the handler boundary and rendered as
//! `{"status": "fail" | "error", "message": ...}`.

use crate::achievements::AchievementError;
use crate::auth::AuthError;
use crate::community::CommunityError;
use crate::content::ValidationError;
use crate::db::DbError;
use crate::market_data::{InvalidSymbol, MarketDataError};
use crate::trading::{TradeError, TradingError};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let label = if self.status.is_server_error() {
            error!("Request failed ({}): {}", self.status, self.message);
            "error"
        } else {
            "fail"
        };

        (
            self.status,
            Json(serde_json::json!({
                "status": label,
                "message": self.message
            })),
        )
            .into_response()
    }
}

// ==========================================
// Extractor rejections
// ==========================================

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

// ==========================================
// Module errors
// ==========================================

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => Self::not_found("Record not found"),
            DbError::InvalidData(msg) => Self::bad_request(msg),
            DbError::Sqlx(e) => {
                error!("Database error: {}", e);
                Self::internal("Database error")
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Encode(_) => Self::internal(err.to_string()),
            other => Self::unauthorized(other.to_string()),
        }
    }
}

impl From<InvalidSymbol> for AppError {
    fn from(err: InvalidSymbol) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.0)
    }
}

impl From<TradeError> for AppError {
    fn from(err: TradeError) -> Self {
        match err {
            TradeError::SymbolNotFound(_) => Self::not_found(err.to_string()),
            _ => Self::bad_request(err.to_string()),
        }
    }
}

impl From<MarketDataError> for AppError {
    fn from(err: MarketDataError) -> Self {
        match err {
            MarketDataError::SymbolNotFound(_) => Self::not_found(err.to_string()),
            MarketDataError::NotConfigured => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            MarketDataError::Database(db) => db.into(),
            MarketDataError::Http(_) | MarketDataError::Provider { .. } | MarketDataError::Url(_) => {
                error!("Market data provider failure: {}", err);
                Self::new(StatusCode::BAD_GATEWAY, "Failed to fetch market data")
            }
        }
    }
}

impl From<TradingError> for AppError {
    fn from(err: TradingError) -> Self {
        match err {
            TradingError::Trade(e) => e.into(),
            TradingError::Market(e) => e.into(),
            TradingError::Database(e) => e.into(),
            TradingError::PortfolioNotFound => Self::not_found(err.to_string()),
            TradingError::Conflict => Self::conflict(err.to_string()),
        }
    }
}

impl From<AchievementError> for AppError {
    fn from(err: AchievementError) -> Self {
        match err {
            AchievementError::AchievementNotFound | AchievementError::ProgressNotFound => {
                Self::not_found(err.to_string())
            }
            AchievementError::NotCompleted(_) | AchievementError::Invalid(_) => {
                Self::bad_request(err.to_string())
            }
            AchievementError::Database(e) => e.into(),
        }
    }
}

impl From<CommunityError> for AppError {
    fn from(err: CommunityError) -> Self {
        match err {
            CommunityError::NotFound(_) => Self::not_found(err.to_string()),
            CommunityError::Forbidden(msg) => Self::forbidden(msg),
            CommunityError::AlreadyEnrolled => Self::bad_request(err.to_string()),
            CommunityError::Invalid(e) => e.into(),
            CommunityError::Database(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Symbol;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_errors_map_to_client_statuses() {
        let symbol = Symbol::parse("AAPL").unwrap();
        let not_found: AppError = TradeError::SymbolNotFound(symbol).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let funds: AppError = TradeError::InsufficientFunds {
            required: dec!(500),
            available: dec!(100),
        }
        .into();
        assert_eq!(funds.status(), StatusCode::BAD_REQUEST);
        assert!(funds.message().contains("Insufficient funds"));
    }

    #[test]
    fn test_conflict_and_provider_statuses() {
        let conflict: AppError = TradingError::Conflict.into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let unconfigured: AppError = MarketDataError::NotConfigured.into();
        assert_eq!(unconfigured.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_community_errors() {
        let missing: AppError = CommunityError::NotFound("Reply").into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.message(), "Reply not found");

        let denied: AppError = CommunityError::Forbidden("You must be enrolled to rate this course").into();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let again: AppError = CommunityError::AlreadyEnrolled.into();
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_database_details_are_hidden() {
        let err: AppError = DbError::Sqlx(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Database error");
    }
}
