//! Market data handlers (public)

use super::{success, success_list, ApiPath, ApiQuery};
use crate::error::AppError;
use crate::market_data::{AssetType, Symbol};
use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_MOVERS: i64 = 5;
const MAX_MOVERS: i64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MoversQuery {
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
    pub limit: Option<i64>,
}

pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    ApiPath(symbol): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let symbol = Symbol::parse(&symbol)?;
    let quote = state.market.quote(&symbol).await?;
    Ok(success(quote))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    ApiPath(symbol): ApiPath<String>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let symbol = Symbol::parse(&symbol)?;
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::bad_request("'from' must not be after 'to'"));
        }
    }

    let bars = state.market.history(&symbol, query.from, query.to).await?;
    Ok(success_list(bars))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let term = query.query.trim();
    if term.is_empty() {
        return Err(AppError::bad_request("Search query is required"));
    }

    let results = state.market.search(term, query.asset_type).await?;
    Ok(success_list(results))
}

pub async fn get_movers(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<MoversQuery>,
) -> Result<impl IntoResponse, AppError> {
    let asset_type = query.asset_type.unwrap_or(AssetType::Stock);
    let limit = query.limit.unwrap_or(DEFAULT_MOVERS).clamp(1, MAX_MOVERS);

    let movers = state.market.top_movers(asset_type, limit).await?;
    Ok(success(movers))
}
