//! Database-backed quote cache in front of the provider client

use super::{AssetType, HistoricalBar, MarketData, MarketDataClient, MarketDataError, Symbol, TopMovers};
use crate::db::Database;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

const SEARCH_LIMIT: i64 = 10;

pub struct MarketDataCache {
    db: Database,
    client: MarketDataClient,
}

impl MarketDataCache {
    pub fn new(db: Database, client: MarketDataClient) -> Self {
        if !client.is_configured() {
            info!("Market data provider not configured - serving cached quotes only");
        }
        Self { db, client }
    }

    /// Current quote for a symbol, refreshed from the provider when missing or stale
    pub async fn quote(&self, symbol: &Symbol) -> Result<MarketData, MarketDataError> {
        let now = Utc::now();
        let cached = self.db.get_market_data(symbol).await?;

        if let Some(data) = &cached {
            if !data.needs_update(now) {
                debug!("Quote cache hit for {}", symbol);
                return Ok(data.clone());
            }
        }

        let fresh = self.client.fetch_quote(symbol).await?;
        let data = fresh.into_market_data(symbol.clone(), cached, now);
        self.db.upsert_quote(&data).await?;
        info!("Refreshed quote for {}: {}", symbol, data.price.current);

        Ok(data)
    }

    /// Cached quotes for several symbols, without refreshing
    pub async fn cached_quotes(&self, symbols: &[Symbol]) -> Result<Vec<MarketData>, MarketDataError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.db.get_market_data_many(symbols).await?)
    }

    /// Daily history for a symbol, fetched from the provider when nothing is stored yet
    pub async fn history(
        &self,
        symbol: &Symbol,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<HistoricalBar>, MarketDataError> {
        let mut data = self.quote(symbol).await?;

        if data.historical.is_empty() {
            let bars = self.client.fetch_history(symbol).await?;
            self.db.update_history(symbol, &bars).await?;
            info!("Stored {} history bars for {}", bars.len(), symbol);
            data.historical = bars;
        }

        Ok(data.history_between(from, to))
    }

    /// Match cached symbols or company names
    pub async fn search(&self, query: &str, asset_type: Option<AssetType>) -> Result<Vec<MarketData>, MarketDataError> {
        Ok(self.db.search_market_data(query, asset_type, SEARCH_LIMIT).await?)
    }

    pub async fn top_movers(&self, asset_type: AssetType, limit: i64) -> Result<TopMovers, MarketDataError> {
        let gainers = self.db.top_movers(asset_type, limit, true).await?;
        let losers = self.db.top_movers(asset_type, limit, false).await?;
        Ok(TopMovers { gainers, losers })
    }
}
