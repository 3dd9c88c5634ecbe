//! Virtual trading handlers

use super::{created, success, success_list, ApiJson, ApiPath, ApiQuery};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::market_data::Symbol;
use crate::trading::{Portfolio, TradeOrder, TradeType, Transaction, TransactionFilter};
use crate::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// Request Types
// ==========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub symbol: String,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub quantity: i64,
    pub portfolio_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortfolioRequest {
    pub name: String,
    pub description: Option<String>,
    pub starting_balance: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioQuery {
    pub portfolio_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub trade_type: Option<TradeType>,
    pub symbol: Option<String>,
    pub limit: Option<usize>,
    pub portfolio_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistRequest {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct TradeResponse {
    pub transaction: Transaction,
    pub portfolio: Portfolio,
}

// ==========================================
// Portfolio Handlers
// ==========================================

pub async fn get_portfolio(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let portfolio = state.trading.default_portfolio(user.id).await?;
    Ok(success(portfolio))
}

pub async fn list_portfolios(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let portfolios = state.trading.list_portfolios(user.id).await?;
    Ok(success_list(portfolios))
}

pub async fn create_portfolio(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreatePortfolioRequest>,
) -> Result<Response, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Portfolio name is required"));
    }
    if matches!(req.starting_balance, Some(balance) if balance <= Decimal::ZERO) {
        return Err(AppError::bad_request("Starting balance must be positive"));
    }

    let portfolio = state
        .trading
        .create_portfolio(user.id, name.to_string(), req.description, req.starting_balance)
        .await?;
    Ok(created(portfolio))
}

pub async fn get_portfolio_by_id(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let portfolio = state.trading.resolve_portfolio(user.id, Some(id)).await?;
    Ok(success(portfolio))
}

pub async fn get_performance(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<PortfolioQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .trading
        .refresh_performance(user.id, query.portfolio_id)
        .await?;
    Ok(success(report))
}

// ==========================================
// Trade Execution
// ==========================================

pub async fn execute_trade(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<TradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let symbol = Symbol::parse(&req.symbol)?;
    let order = TradeOrder::new(symbol, req.trade_type, req.quantity)?;

    let (portfolio, transaction) = state
        .trading
        .execute_trade(user.id, req.portfolio_id, order)
        .await?;

    Ok(success(TradeResponse {
        transaction,
        portfolio,
    }))
}

pub async fn get_transactions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<TransactionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let symbol = query.symbol.as_deref().map(Symbol::parse).transpose()?;
    let filter = TransactionFilter {
        start_date: query.start_date,
        end_date: query.end_date,
        trade_type: query.trade_type,
        symbol,
        limit: query.limit,
    };

    let transactions = state
        .trading
        .transactions(user.id, query.portfolio_id, &filter)
        .await?;
    Ok(success_list(transactions))
}

// ==========================================
// Watchlist
// ==========================================

pub async fn get_watchlist(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let quotes = state.trading.watchlist(user.id).await?;
    Ok(success_list(quotes))
}

pub async fn add_to_watchlist(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<WatchlistRequest>,
) -> Result<Response, AppError> {
    let symbol = Symbol::parse(&req.symbol)?;
    let portfolio = state.trading.add_to_watchlist(user.id, symbol).await?;
    Ok(created(portfolio.watchlist))
}

pub async fn remove_from_watchlist(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(symbol): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let symbol = Symbol::parse(&symbol)?;
    let portfolio = state.trading.remove_from_watchlist(user.id, &symbol).await?;
    Ok(success(portfolio.watchlist))
}
